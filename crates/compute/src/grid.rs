//! Wrap-aware bilinear sampling of lat/lon grids.

use formats::{FormatError, GridHeader, GridRecord, ValidTime};
use foundation::math::{floor_mod, normalize_lon};

#[derive(Debug)]
pub enum GridError {
    Format(FormatError),
    RecordCount(usize),
    LatticeMismatch,
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridError::Format(e) => write!(f, "{e}"),
            GridError::RecordCount(n) => {
                write!(f, "expected 1 (scalar) or 2 (vector) records, got {n}")
            }
            GridError::LatticeMismatch => write!(f, "u and v records have different lattices"),
        }
    }
}

impl std::error::Error for GridError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GridError::Format(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FormatError> for GridError {
    fn from(e: FormatError) -> Self {
        GridError::Format(e)
    }
}

/// Interpolated value at a geographic point.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Sample {
    Scalar(f64),
    /// `[u, v, magnitude]`.
    Vector([f64; 3]),
}

impl Sample {
    /// The scalar, or the vector's magnitude.
    pub fn magnitude(&self) -> f64 {
        match *self {
            Sample::Scalar(v) => v,
            Sample::Vector(w) => w[2],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Values {
    Scalar(Vec<f32>),
    Vector { u: Vec<f32>, v: Vec<f32> },
}

/// Dense grid with rows stored north to south. Missing samples are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    header: GridHeader,
    lon0: f64,
    lat0: f64,
    dx: f64,
    dy: f64,
    nx: usize,
    ny: usize,
    continuous: bool,
    values: Values,
}

impl Grid {
    /// Builds a scalar grid from one record, or a vector grid from a u/v pair.
    pub fn from_records(records: &[GridRecord]) -> Result<Self, GridError> {
        match records {
            [scalar] => Self::scalar(scalar),
            [u, v] => Self::vector(u, v),
            _ => Err(GridError::RecordCount(records.len())),
        }
    }

    pub fn scalar(record: &GridRecord) -> Result<Self, GridError> {
        record.validate()?;
        let mut grid = Self::lattice(&record.header);
        grid.values = Values::Scalar(normalize_rows(&record.header, &record.data));
        Ok(grid)
    }

    pub fn vector(u: &GridRecord, v: &GridRecord) -> Result<Self, GridError> {
        u.validate()?;
        v.validate()?;
        if !u.header.same_lattice(&v.header) {
            return Err(GridError::LatticeMismatch);
        }
        let mut grid = Self::lattice(&u.header);
        grid.values = Values::Vector {
            u: normalize_rows(&u.header, &u.data),
            v: normalize_rows(&v.header, &v.data),
        };
        Ok(grid)
    }

    fn lattice(header: &GridHeader) -> Self {
        let dx = header.dx;
        Self {
            header: header.clone(),
            lon0: header.lo1,
            lat0: header.north_lat(),
            dx,
            dy: header.dy.abs(),
            nx: header.nx,
            ny: header.ny,
            continuous: (header.nx as f64 * dx).floor() >= 360.0,
            values: Values::Scalar(Vec::new()),
        }
    }

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    pub fn is_vector(&self) -> bool {
        matches!(self.values, Values::Vector { .. })
    }

    /// True when the grid spans all longitudes.
    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    /// Human-readable data provider.
    pub fn source(&self) -> String {
        const NCEP: &str =
            "US National Weather Service, National Centres for Environmental Prediction (NCEP)";
        match (self.header.center, self.header.center_name.as_deref()) {
            (Some(-3), _) => "OSCAR / Earth & Space Research".to_string(),
            (Some(7), _) | (None, Some(NCEP)) => "GFS / NCEP / US National Weather Service".to_string(),
            (_, name) => name.unwrap_or_default().to_string(),
        }
    }

    pub fn valid_time(&self) -> Result<ValidTime, FormatError> {
        self.header.valid_time()
    }

    fn corner(&self, i: usize, j: usize) -> Option<Sample> {
        let k = j * self.nx + i;
        match &self.values {
            Values::Scalar(s) => {
                let g = s[k];
                (!g.is_nan()).then_some(Sample::Scalar(g as f64))
            }
            Values::Vector { u, v } => {
                let (gu, gv) = (u[k], v[k]);
                (!gu.is_nan() && !gv.is_nan()).then_some(Sample::Vector([gu as f64, gv as f64, 0.0]))
            }
        }
    }

    /// Bilinear value at `(lon, lat)` in degrees, or `None` outside the grid
    /// or when any enclosing sample is missing.
    pub fn interpolate(&self, lon: f64, lat: f64) -> Option<Sample> {
        let mut i = floor_mod(lon - self.lon0, 360.0) / self.dx;
        // floor_mod rounds tiny negative offsets up to a full turn.
        if self.continuous && i >= self.nx as f64 {
            i -= self.nx as f64;
        }
        let j = (self.lat0 - lat) / self.dy;
        if !(i.is_finite() && j.is_finite()) || i < 0.0 || j < 0.0 {
            return None;
        }
        let (fi, fj) = (i.floor() as usize, j.floor() as usize);
        if fi >= self.nx || fj >= self.ny {
            return None;
        }
        let mut ci = fi + 1;
        if ci >= self.nx {
            // The first column closes the gap past the last meridian.
            if self.continuous && ci == self.nx {
                ci = 0;
            } else {
                return None;
            }
        }
        let mut cj = fj + 1;
        if cj >= self.ny {
            // Exactly on the last row.
            if j == fj as f64 {
                cj = fj;
            } else {
                return None;
            }
        }

        let g00 = self.corner(fi, fj)?;
        let g10 = self.corner(ci, fj)?;
        let g01 = self.corner(fi, cj)?;
        let g11 = self.corner(ci, cj)?;

        let x = i - fi as f64;
        let y = j - fj as f64;
        let rx = 1.0 - x;
        let ry = 1.0 - y;
        let (a, b, c, d) = (rx * ry, x * ry, rx * y, x * y);
        match (g00, g10, g01, g11) {
            (Sample::Scalar(g00), Sample::Scalar(g10), Sample::Scalar(g01), Sample::Scalar(g11)) => {
                Some(Sample::Scalar(g00 * a + g10 * b + g01 * c + g11 * d))
            }
            (Sample::Vector(g00), Sample::Vector(g10), Sample::Vector(g01), Sample::Vector(g11)) => {
                let u = g00[0] * a + g10[0] * b + g01[0] * c + g11[0] * d;
                let v = g00[1] * a + g10[1] * b + g01[1] * c + g11[1] * d;
                Some(Sample::Vector([u, v, (u * u + v * v).sqrt()]))
            }
            _ => None,
        }
    }

    /// Scalar value or vector magnitude at `(lon, lat)`.
    pub fn interpolate_scalar(&self, lon: f64, lat: f64) -> Option<f64> {
        self.interpolate(lon, lat).map(|s| s.magnitude())
    }

    /// Visits every native grid point with its longitude normalized to
    /// `[-180, 180)`. Missing samples are reported as `None`.
    pub fn for_each_point(&self, mut f: impl FnMut(f64, f64, Option<Sample>)) {
        for j in 0..self.ny {
            let lat = self.lat0 - j as f64 * self.dy;
            for i in 0..self.nx {
                let lon = normalize_lon(self.lon0 + i as f64 * self.dx);
                let value = self.corner(i, j).map(|s| match s {
                    Sample::Vector([u, v, _]) => Sample::Vector([u, v, (u * u + v * v).sqrt()]),
                    s => s,
                });
                f(lon, lat, value);
            }
        }
    }
}

/// Copies samples into north-to-south row order, mapping missing values to NaN.
fn normalize_rows(header: &GridHeader, data: &[Option<f64>]) -> Vec<f32> {
    let (nx, ny) = (header.nx, header.ny);
    let flip = header.scans_northward();
    let mut out = vec![f32::NAN; nx * ny];
    for j in 0..ny {
        let dst = if flip { ny - 1 - j } else { j };
        for i in 0..nx {
            if let Some(v) = data[j * nx + i].filter(|v| v.is_finite()) {
                out[dst * nx + i] = v as f32;
            }
        }
    }
    out
}
