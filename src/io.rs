use fitrs::{Fits, FitsData, Hdu, HeaderValue};
use ndarray::{Array1, Array2, ArrayD, Axis, IxDyn};

use crate::atmgrid::TemplateSpectrum;
use crate::observation::Observation;
use crate::{IsoFmError, Result};

/// Load the primary image of a FITS file, numpy style: the last axis is
/// NAXIS1. Blank integer pixels become NaN.
pub fn read_fits_array(filename: &str) -> Result<ArrayD<f64>> {
    let fits = Fits::open(filename)?;
    if let Some(hdu) = fits.get(0) {
        let naxis = match hdu.value("NAXIS") {
            Some(HeaderValue::IntegerNumber(n)) if (1..=3).contains(n) => *n as usize,
            _ => {
                return Err(IsoFmError::InvalidFITS(format!(
                    "expected 1 <= NAXIS <= 3 in {}",
                    filename
                )))
            }
        };
        let mut shape = vec![0; naxis];
        for i in 0..naxis {
            let key = format!("NAXIS{}", i + 1);
            match hdu.value(&key) {
                Some(HeaderValue::IntegerNumber(x)) if *x > 0 => {
                    shape[naxis - 1 - i] = *x as usize;
                }
                _ => {
                    return Err(IsoFmError::InvalidFITS(format!(
                        "invalid {} in {}",
                        key, filename
                    )))
                }
            }
        }
        let data: Vec<f64> = match hdu.read_data() {
            FitsData::IntegersI32(array) => array
                .data
                .iter()
                .map(|x| x.map_or(f64::NAN, |v| v as f64))
                .collect(),
            FitsData::IntegersU32(array) => array
                .data
                .iter()
                .map(|x| x.map_or(f64::NAN, |v| v as f64))
                .collect(),
            FitsData::FloatingPoint32(array) => array.data.iter().map(|x| *x as f64).collect(),
            FitsData::FloatingPoint64(array) => array.data,
            FitsData::Characters(array) => array.data.iter().map(|x| *x as u8 as f64).collect(),
        };
        ArrayD::from_shape_vec(IxDyn(&shape), data)
            .map_err(|e| IsoFmError::InvalidFITS(format!("{}: {}", filename, e)))
    } else {
        Err(IsoFmError::InvalidFITS(format!("no primary hdu in {}", filename)))
    }
}

/// Load a 1D FITS vector, e.g. a transmission spectrum.
pub fn read_fits_vector(filename: &str) -> Result<Array1<f64>> {
    let array = read_fits_array(filename)?;
    if array.ndim() != 1 {
        return Err(IsoFmError::InvalidFITS(format!(
            "expected a 1D array in {}, got shape {:?}",
            filename,
            array.shape()
        )));
    }
    Ok(Array1::from(array.into_raw_vec()))
}

/// Load a template stored as a `(2, n)` image: wavelengths in the first row,
/// flux in the second.
pub fn read_template(filename: &str) -> Result<TemplateSpectrum> {
    let array = read_fits_array(filename)?;
    if array.ndim() != 2 || array.shape()[0] != 2 {
        return Err(IsoFmError::InvalidFITS(format!(
            "template {} must have shape (2, n), got {:?}",
            filename,
            array.shape()
        )));
    }
    Ok(TemplateSpectrum {
        wavelengths: array.index_axis(Axis(0), 0).iter().copied().collect(),
        flux: array.index_axis(Axis(0), 1).iter().copied().collect(),
    })
}

/// Assemble an observation from FITS files of native rank.
pub fn read_observation(
    data: &str,
    noise: Option<&str>,
    bad_pixels: Option<&str>,
    wavelengths: &str,
    bary_rv: f64,
) -> Result<Observation> {
    let noise = noise.map(read_fits_array).transpose()?;
    let bad_pixels = bad_pixels.map(read_fits_array).transpose()?;
    Observation::new(
        read_fits_array(wavelengths)?,
        read_fits_array(data)?,
        noise,
        bad_pixels,
        bary_rv,
    )
}

/// Save a matrix (e.g. the linear model) as the primary image.
pub fn write_fits_matrix(filename: &str, m: &Array2<f64>) -> Result<()> {
    let data: Vec<f64> = m.iter().copied().collect();
    // fits axis order, NAXIS1 first
    let primary_hdu = Hdu::new(&[m.ncols(), m.nrows()], data);
    Fits::create(filename, primary_hdu)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.fits");
        let path = path.to_str().unwrap();
        let m = Array2::from_shape_fn((3, 4), |(i, j)| i as f64 * 10.0 + j as f64);
        write_fits_matrix(path, &m).unwrap();
        let back = read_fits_array(path).unwrap();
        assert_eq!(back.shape(), &[3, 4]);
        assert_eq!(back[[2, 1]], 21.0);
    }

    #[test]
    fn template_needs_two_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.fits");
        let path = path.to_str().unwrap();
        let t = Array2::from_shape_fn((2, 5), |(i, j)| if i == 0 { 2.0 + 0.1 * j as f64 } else { 1.0 });
        write_fits_matrix(path, &t).unwrap();
        let template = read_template(path).unwrap();
        assert_eq!(template.wavelengths.len(), 5);
        assert_eq!(template.flux[3], 1.0);

        let bad = dir.path().join("bad.fits");
        let bad = bad.to_str().unwrap();
        write_fits_matrix(bad, &Array2::zeros((3, 5))).unwrap();
        assert!(read_template(bad).is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(read_fits_array("/nonexistent/cube.fits"), Err(IsoFmError::Io(_))));
    }
}
