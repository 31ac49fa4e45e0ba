pub fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Elapsed time as `m:ss`, or `h:mm:ss` past an hour.
pub fn format_duration(micros: i64) -> String {
    let total = micros.max(0) / 1_000_000;
    let (h, m, s) = (total / 3600, (total / 60) % 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

/// Routes `log` output through the test harness. Set `RUST_LOG=abc_codec=trace`
/// to see it.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[cfg(test)]
pub(crate) fn parse_abc_str(
    abc: &str,
) -> Result<(crate::timeline::Timeline, crate::info::AbcInfo), crate::error::ParseError> {
    init_test_logging();
    let mut params = crate::config::ParseParams::with_seed(1);
    params.stereo_pan = false;
    params.generate_regions = true;
    crate::parser::convert(&[crate::file::AbcFile::from_text("test.abc", abc)], &mut params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tests() {
        assert_eq!(gcd(12, 18), 6);
        assert_eq!(gcd(-4, 6), 2);
        assert_eq!(gcd(7, 0), 7);
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(65_400_000), "1:05");
        assert_eq!(format_duration(3_725_000_000), "1:02:05");
    }
}
