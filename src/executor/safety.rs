// Argument range checks applied before any action reaches the desktop.
use crate::errors::{DeskBenchError, DeskBenchResult};
use crate::perception::types::{ScreenPoint, ScreenSize};

/// Longest accepted `wait`, in seconds.
pub const MAX_WAIT_SECS: f64 = 60.0;

/// Rejects coordinates outside the visible screen.
pub fn check_point(screen: ScreenSize, x: i64, y: i64) -> DeskBenchResult<ScreenPoint> {
    let in_range = |v: i64| i32::try_from(v).ok();
    let point = match (in_range(x), in_range(y)) {
        (Some(x), Some(y)) => ScreenPoint::new(x, y),
        _ => {
            return Err(DeskBenchError::InvalidAction(format!(
                "coordinates ({x}, {y}) are out of range"
            )))
        }
    };
    if !screen.contains(point) {
        return Err(DeskBenchError::InvalidAction(format!(
            "coordinates ({x}, {y}) are outside the {}x{} screen",
            screen.width, screen.height
        )));
    }
    Ok(point)
}

pub fn check_wait(seconds: f64) -> DeskBenchResult<f64> {
    if !seconds.is_finite() || !(0.0..=MAX_WAIT_SECS).contains(&seconds) {
        return Err(DeskBenchError::InvalidAction(format!(
            "wait must be between 0 and {MAX_WAIT_SECS} seconds, got {seconds}"
        )));
    }
    Ok(seconds)
}

pub fn check_non_empty<'a>(field: &str, value: &'a str) -> DeskBenchResult<&'a str> {
    if value.trim().is_empty() {
        return Err(DeskBenchError::InvalidAction(format!("`{field}` must not be empty")));
    }
    Ok(value)
}

/// Adds `https://` when the URL has no scheme.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

/// Splits a key chord such as `ctrl+shift+t` into lowercase key names.
pub fn parse_keys(key: &str) -> DeskBenchResult<Vec<String>> {
    let key = key.trim();
    // A lone "+" is the plus key, not a separator.
    if key == "+" {
        return Ok(vec!["+".to_string()]);
    }
    let keys: Vec<String> = key
        .split('+')
        .map(|k| k.trim().to_lowercase())
        .collect();
    if keys.iter().any(|k| k.is_empty()) {
        return Err(DeskBenchError::InvalidAction(format!("malformed key chord `{key}`")));
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: ScreenSize = ScreenSize { width: 1024, height: 768 };

    #[test]
    fn points_inside_pass() {
        assert_eq!(check_point(SCREEN, 0, 0).expect("origin"), ScreenPoint::new(0, 0));
        assert_eq!(check_point(SCREEN, 1023, 767).expect("corner"), ScreenPoint::new(1023, 767));
    }

    #[test]
    fn points_outside_fail() {
        for (x, y) in [(1024, 0), (0, 768), (-5, 10), (i64::MAX, 0)] {
            assert!(matches!(
                check_point(SCREEN, x, y),
                Err(DeskBenchError::InvalidAction(_))
            ));
        }
    }

    #[test]
    fn wait_range() {
        assert!(check_wait(3.0).is_ok());
        assert!(check_wait(0.0).is_ok());
        assert!(check_wait(-1.0).is_err());
        assert!(check_wait(61.0).is_err());
        assert!(check_wait(f64::NAN).is_err());
    }

    #[test]
    fn url_scheme_added_once() {
        assert_eq!(normalize_url("wikipedia.org"), "https://wikipedia.org");
        assert_eq!(normalize_url("http://x.org"), "http://x.org");
        assert_eq!(normalize_url(" https://x.org "), "https://x.org");
    }

    #[test]
    fn key_chords() {
        assert_eq!(parse_keys("Enter").expect("enter"), vec!["enter"]);
        assert_eq!(parse_keys("ctrl+F").expect("chord"), vec!["ctrl", "f"]);
        assert_eq!(parse_keys("+").expect("plus"), vec!["+"]);
        assert!(parse_keys("ctrl+").is_err());
        assert!(parse_keys("").is_err());
    }
}
