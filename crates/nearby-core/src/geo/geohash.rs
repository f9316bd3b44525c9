//! Geohash codec.
//!
//! Interleaves longitude (even bits) and latitude (odd bits) bisections of
//! the `[-90, 90] x [-180, 180]` box and emits one base32 symbol per five
//! bits.

use std::collections::BTreeSet;

/// Standard geohash alphabet.
pub const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Precision at which record locations are stored.
pub const STORAGE_PRECISION: usize = 8;

/// Longest precision the codec produces; f64 coordinates carry no more
/// information past this point.
pub const MAX_PRECISION: usize = 12;

const BITS: [u8; 5] = [16, 8, 4, 2, 1];

/// Latitude bound used when stepping into neighbor cells; keeps the poles
/// themselves out of the encoder.
const POLAR_LIMIT: f64 = 89.999_999;

/// Encode a coordinate at the given precision (clamped to [`MAX_PRECISION`]).
pub fn encode(latitude: f64, longitude: f64, precision: usize) -> String {
    let precision = precision.min(MAX_PRECISION);
    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);

    let mut geohash = String::with_capacity(precision);
    let mut even_bit = true;
    let mut bit = 0;
    let mut ch = 0_u8;

    while geohash.len() < precision {
        if even_bit {
            let mid = (lon_range.0 + lon_range.1) / 2.0;
            if longitude >= mid {
                ch |= BITS[bit];
                lon_range.0 = mid;
            } else {
                lon_range.1 = mid;
            }
        } else {
            let mid = (lat_range.0 + lat_range.1) / 2.0;
            if latitude >= mid {
                ch |= BITS[bit];
                lat_range.0 = mid;
            } else {
                lat_range.1 = mid;
            }
        }

        even_bit = !even_bit;
        if bit < 4 {
            bit += 1;
        } else {
            geohash.push(BASE32[ch as usize] as char);
            bit = 0;
            ch = 0;
        }
    }

    geohash
}

/// The cell containing the point plus its eight compass neighbors.
///
/// Cells collapse at the poles and can wrap across the antimeridian, so the
/// returned set may hold fewer than nine entries.
pub fn neighbors(latitude: f64, longitude: f64, precision: usize) -> BTreeSet<String> {
    let precision = precision.min(MAX_PRECISION);
    let (lat_delta, lon_delta) = cell_size(precision);

    let mut cells = BTreeSet::new();
    for dy in -1..=1 {
        for dx in -1..=1 {
            let lat = clamp_latitude(latitude + f64::from(dy) * lat_delta);
            let lon = wrap_longitude(longitude + f64::from(dx) * lon_delta);
            cells.insert(encode(lat, lon, precision));
        }
    }
    cells
}

/// Angular (latitude, longitude) extent of one cell.
fn cell_size(precision: usize) -> (f64, f64) {
    let total_bits = (precision * 5) as i32;
    let lon_bits = (total_bits + 1) / 2;
    let lat_bits = total_bits / 2;

    (180.0 / 2f64.powi(lat_bits), 360.0 / 2f64.powi(lon_bits))
}

fn clamp_latitude(latitude: f64) -> f64 {
    latitude.clamp(-POLAR_LIMIT, POLAR_LIMIT)
}

fn wrap_longitude(longitude: f64) -> f64 {
    let wrapped = (longitude + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_vectors() {
        assert_eq!(encode(57.64911, 10.40744, 11), "u4pruydqqvj");
        assert_eq!(encode(37.4991, 127.0313, 8), "wydm6dt2");
        assert_eq!(encode(37.4991, 127.0313, 5), "wydm6");
        assert_eq!(encode(0.0, 0.0, 5), "s0000");
    }

    #[test]
    fn test_encode_box_corners() {
        assert_eq!(encode(-90.0, -180.0, 4), "0000");
        assert_eq!(encode(90.0, 180.0, 4), "zzzz");
    }

    #[test]
    fn test_encode_is_deterministic() {
        let a = encode(35.1796, 129.0756, 8);
        let b = encode(35.1796, 129.0756, 8);
        assert_eq!(a, b);
        assert_eq!(a, "wy7b1hmb");
    }

    #[test]
    fn test_encode_prefix_property() {
        let long = encode(37.4991, 127.0313, 9);
        for p in 1..9 {
            assert_eq!(encode(37.4991, 127.0313, p), long[..p]);
        }
    }

    #[test]
    fn test_encode_precision_clamped() {
        assert_eq!(encode(10.0, 10.0, 40).len(), MAX_PRECISION);
        assert_eq!(encode(10.0, 10.0, 0), "");
    }

    #[test]
    fn test_neighbors_full_window() {
        let cells = neighbors(37.4991, 127.0313, 5);
        let expected: BTreeSet<String> = [
            "wydm1", "wydm3", "wydm4", "wydm5", "wydm6", "wydm7", "wydm9", "wydmd", "wydme",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(cells, expected);
    }

    #[test]
    fn test_neighbors_contain_center() {
        for (lat, lon) in [(37.4991, 127.0313), (-33.86, 151.2), (0.0, 0.0), (64.1, -21.9)] {
            for precision in 1..=8 {
                let cells = neighbors(lat, lon, precision);
                assert!(cells.contains(&encode(lat, lon, precision)));
                assert!(cells.len() <= 9);
            }
        }
    }

    #[test]
    fn test_neighbors_collapse_at_pole() {
        let cells = neighbors(89.9999, 0.0, 3);
        assert_eq!(cells.len(), 6);
        assert!(cells.contains("upb"));
    }

    #[test]
    fn test_neighbors_wrap_antimeridian() {
        let cells = neighbors(0.0, 179.99, 2);
        assert_eq!(cells.len(), 9);
        // western-hemisphere cells appear because longitude wraps
        assert!(cells.contains("80"));
        assert!(cells.contains("2p"));
    }

    #[test]
    fn test_wrap_longitude() {
        assert_eq!(wrap_longitude(180.0), -180.0);
        assert_eq!(wrap_longitude(-180.5), 179.5);
        assert_eq!(wrap_longitude(190.0), -170.0);
        assert_eq!(wrap_longitude(12.5), 12.5);
    }
}
