/// Reference ellipsoid parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Datum {
    semimajor: f64,
    inv_flattening: f64,
}

impl Datum {
    /// WGS84 datum.
    pub const WGS84: Self = Datum {
        semimajor: 6_378_137.0,
        inv_flattening: 298.257223563,
    };

    /// Semimajor axis in meters.
    pub fn semimajor(&self) -> f64 {
        self.semimajor
    }

    /// Inverse flattening.
    pub fn inv_flattening(&self) -> f64 {
        self.inv_flattening
    }

    /// Approximate length of one degree of latitude in meters at the given latitude.
    pub fn meters_per_degree_lat(&self, lat: f64) -> f64 {
        let rlat = lat.to_radians();
        111_132.92 - 559.82 * (2.0 * rlat).cos() + 1.175 * (4.0 * rlat).cos()
            - 0.0023 * (6.0 * rlat).cos()
    }

    /// Approximate length of one degree of longitude in meters at the given latitude.
    pub fn meters_per_degree_lon(&self, lat: f64) -> f64 {
        let rlat = lat.to_radians();
        111_412.84 * rlat.cos() - 93.5 * (3.0 * rlat).cos() + 0.118 * (5.0 * rlat).cos()
    }
}

impl Default for Datum {
    fn default() -> Self {
        Self::WGS84
    }
}
