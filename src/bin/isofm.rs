use anyhow::{bail, Context, Result};
use clap::Parser;
use isofm::{io, par_fit, FmConfig, IsoAtmGridSplineFm, IsoFmError, Vec2D};
use ndarray::Array1;

/// Evaluate the spline continuum forward model of a single template against
/// an observation and solve for the linear parameters.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Forward model settings, written with defaults if missing
    #[arg(long, default_value = "fm.yaml")]
    config: String,
    /// Data FITS file (1 to 3 axes)
    #[arg(long)]
    data: String,
    #[arg(long)]
    noise: Option<String>,
    /// Bad pixel map, NaN marks bad pixels
    #[arg(long)]
    bad_pixels: Option<String>,
    #[arg(long)]
    wavelengths: String,
    /// Template spectrum, (2, n) image of wavelengths and flux
    #[arg(long)]
    template: String,
    /// Transmission spectrum, unity if not given
    #[arg(long)]
    transmission: Option<String>,
    /// Barycentric radial velocity, km/s
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    bary_rv: f64,
    /// Reference position "x,y" in pixels
    #[arg(long, allow_hyphen_values = true)]
    refpos: Option<String>,
    /// Comma separated non-linear parameters "vsini,rv[,y[,x]]", repeat to
    /// evaluate several vectors
    #[arg(long = "params", required = true, allow_hyphen_values = true)]
    params: Vec<String>,
    /// Write the linear model of the first parameter vector to this FITS file
    #[arg(long)]
    output: Option<String>,
}

fn parse_list(s: &str) -> Result<Vec<f64>> {
    s.split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .with_context(|| format!("failed to parse {:?} in {:?}", v, s))
        })
        .collect()
}

fn load_config(filename: &str) -> Result<FmConfig> {
    match FmConfig::from_yaml(filename) {
        Ok(config) => Ok(config),
        Err(IsoFmError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            // file doesn't exist, create one with defaults
            let config = FmConfig::default();
            config.to_yaml(filename)?;
            log::info!("wrote default settings to {}", filename);
            Ok(config)
        }
        Err(e) => Err(e).with_context(|| format!("reading {}", filename)),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    // settings and parameters first, they are the likeliest source of user error
    let config = load_config(&args.config)?;
    let paras = args
        .params
        .iter()
        .map(|p| parse_list(p))
        .collect::<Result<Vec<Vec<f64>>>>()?;

    log::info!("loading observation");
    let mut obs = io::read_observation(
        &args.data,
        args.noise.as_deref(),
        args.bad_pixels.as_deref(),
        &args.wavelengths,
        args.bary_rv,
    )?;
    if let Some(refpos) = &args.refpos {
        let refpos = parse_list(refpos)?;
        if refpos.len() != 2 {
            bail!("refpos needs two values, got {}", refpos.len());
        }
        obs = obs.with_refpos(Vec2D::new(refpos[0], refpos[1]));
    }
    let template = io::read_template(&args.template)?;
    let transmission = match &args.transmission {
        Some(filename) => io::read_fits_vector(filename)?,
        None => Array1::ones(obs.shape().0),
    };

    let fm = IsoAtmGridSplineFm::new(&template, transmission.view(), config);
    log::info!("evaluating {} parameter vectors", paras.len());
    for (p, fit) in paras.iter().zip(par_fit(&fm, &obs, &paras)) {
        match fit? {
            Some(fit) => {
                println!(
                    "{:?}: chi2 {:.6}, reduced chi2 {:.6}, {} pixels",
                    p,
                    fit.chi2,
                    fit.reduced_chi2(),
                    fit.n_data
                );
                for coeff in fit.coeffs.iter() {
                    println!("{:13.8}", coeff);
                }
            }
            None => println!("{:?}: no usable pixels", p),
        }
    }

    if let Some(output) = &args.output {
        let out = fm.build(&paras[0], &obs)?;
        io::write_fits_matrix(output, &out.m)?;
        log::info!("linear model {:?} written to {}", out.m.dim(), output);
    }
    Ok(())
}
