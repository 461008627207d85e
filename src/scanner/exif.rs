use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exif::{In, Tag, Value};

/// EXIF の GPS 座標を "緯度, 経度" の文字列で返す
pub fn extract_gps(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let mut bufreader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut bufreader)?;

    let latitude = read_coordinate(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S')
        .ok_or("No GPS latitude in EXIF")?;
    let longitude = read_coordinate(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W')
        .ok_or("No GPS longitude in EXIF")?;

    Ok(format_coordinates(latitude, longitude))
}

pub fn format_coordinates(latitude: f64, longitude: f64) -> String {
    format!("{:.5}, {:.5}", latitude, longitude)
}

/// 度分秒の有理数3つを10進の度に変換。南緯・西経は負にする
fn read_coordinate(
    exif: &exif::Exif,
    value_tag: Tag,
    ref_tag: Tag,
    negative_ref: u8,
) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let degrees = match &field.value {
        Value::Rational(parts) if !parts.is_empty() => parts
            .iter()
            .zip([1.0, 60.0, 3600.0])
            .map(|(r, div)| r.to_f64() / div)
            .sum::<f64>(),
        _ => return None,
    };

    let negative = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(|f| match &f.value {
            Value::Ascii(strings) => strings.first().and_then(|s| s.first()).copied(),
            _ => None,
        })
        .is_some_and(|c| c.eq_ignore_ascii_case(&negative_ref));

    Some(if negative { -degrees } else { degrees })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_coordinates() {
        assert_eq!(format_coordinates(35.681236, 139.767139), "35.68124, 139.76714");
        assert_eq!(format_coordinates(-33.8688, -151.2093), "-33.86880, -151.20930");
    }

    #[test]
    fn test_extract_gps_without_exif() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.jpg");
        std::fs::write(&path, b"not a jpeg").unwrap();
        assert!(extract_gps(&path).is_err());
    }
}
