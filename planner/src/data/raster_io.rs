//! ESRI ASCII grid reading and writing.
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{PlanError, PlanResult};
use crate::models::raster::{GeoTransform, Raster};

pub const NODATA: f64 = -9999.0;

fn header_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let mut parts = line.split_whitespace();
    let name = parts.next()?;
    if name.eq_ignore_ascii_case(key) {
        parts.next()
    } else {
        None
    }
}

fn parse<T: std::str::FromStr>(value: &str, key: &str) -> PlanResult<T> {
    value
        .parse::<T>()
        .map_err(|_| PlanError::Raster(format!("invalid {} '{}'", key, value)))
}

/// Reads a grid; cells equal to the file's NODATA value become NaN.
pub fn read_ascii_grid<R: Read>(reader: R) -> PlanResult<Raster<f64>> {
    let mut lines = BufReader::new(reader).lines();
    let mut header = Vec::new();
    let mut first_data_line = None;

    // Five mandatory keys, NODATA_value optional
    while let Some(line) = lines.next() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let starts_with_key = line
            .split_whitespace()
            .next()
            .map(|t| t.chars().next().is_some_and(|c| c.is_ascii_alphabetic()))
            .unwrap_or(false);
        if starts_with_key {
            header.push(line);
        } else {
            first_data_line = Some(line);
            break;
        }
    }

    let find = |key: &str| -> Option<String> {
        header.iter().find_map(|l| header_value(l, key).map(str::to_string))
    };
    let required = |key: &str| find(key).ok_or_else(|| PlanError::Raster(format!("missing header '{}'", key)));

    let ncols: usize = parse(&required("ncols")?, "ncols")?;
    let nrows: usize = parse(&required("nrows")?, "nrows")?;
    let cell_size: f64 = parse(&required("cellsize")?, "cellsize")?;
    let (xll, yll) = match (find("xllcorner"), find("yllcorner")) {
        (Some(x), Some(y)) => (parse(&x, "xllcorner")?, parse(&y, "yllcorner")?),
        _ => {
            let x: f64 = parse(&required("xllcenter")?, "xllcenter")?;
            let y: f64 = parse(&required("yllcenter")?, "yllcenter")?;
            (x - cell_size / 2.0, y - cell_size / 2.0)
        }
    };
    let nodata: Option<f64> = find("NODATA_value").map(|v| parse(&v, "NODATA_value")).transpose()?;

    if cell_size <= 0.0 {
        return Err(PlanError::Raster(format!("cell size must be positive, found {}", cell_size)));
    }

    let mut values = Vec::with_capacity(ncols * nrows);
    let mut push_line = |line: &str| -> PlanResult<()> {
        for token in line.split_whitespace() {
            let v: f64 = parse(token, "cell value")?;
            values.push(match nodata {
                Some(nd) if v == nd => f64::NAN,
                _ => v,
            });
        }
        Ok(())
    };
    if let Some(line) = first_data_line {
        push_line(&line)?;
    }
    for line in lines {
        push_line(&line?)?;
    }

    let transform = GeoTransform { ncols, nrows, xll, yll, cell_size };
    debug!("Read {}x{} ASCII grid", nrows, ncols);
    Raster::from_vec(transform, values)
}

pub fn write_ascii_grid<W: Write>(raster: &Raster<f64>, writer: W) -> PlanResult<()> {
    let t = &raster.transform;
    let mut w = BufWriter::new(writer);
    writeln!(w, "ncols {}", t.ncols)?;
    writeln!(w, "nrows {}", t.nrows)?;
    writeln!(w, "xllcorner {}", t.xll)?;
    writeln!(w, "yllcorner {}", t.yll)?;
    writeln!(w, "cellsize {}", t.cell_size)?;
    writeln!(w, "NODATA_value {}", NODATA)?;
    for row in raster.values().chunks(t.ncols.max(1)) {
        let line: Vec<String> = row
            .iter()
            .map(|v| if v.is_finite() { v.to_string() } else { NODATA.to_string() })
            .collect();
        writeln!(w, "{}", line.join(" "))?;
    }
    w.flush()?;
    Ok(())
}

pub fn load_ascii_grid(path: &Path) -> PlanResult<Raster<f64>> {
    let file = File::open(path)?;
    read_ascii_grid(file).map_err(|e| match e {
        PlanError::Raster(msg) => PlanError::Raster(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

pub fn save_ascii_grid(raster: &Raster<f64>, path: &Path) -> PlanResult<()> {
    write_ascii_grid(raster, File::create(path)?)
}

/// Widens a byte raster for writing.
pub fn to_f64(raster: &Raster<u8>) -> Raster<f64> {
    let mut wide = Raster::filled(raster.transform, 0.0);
    for (i, &v) in raster.values().iter().enumerate() {
        wide.set_flat(i, v as f64);
    }
    wide
}
