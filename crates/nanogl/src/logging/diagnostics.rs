/// Prefixes every line of `source` with its 1-based line number.
///
/// Native compiler logs refer to line numbers, so sources are echoed this
/// way next to the log.
pub fn numbered_lines(source: &str) -> impl Iterator<Item = String> + '_ {
    source
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{}: {}", i + 1, line))
}

/// Logs `source` line by line at `level`, numbered, under `label`.
pub fn log_numbered_source(level: log::Level, label: &str, source: &str) {
    if !log::log_enabled!(level) {
        return;
    }
    for line in numbered_lines(source) {
        log::log!(level, "{label} {line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_start_at_one() {
        let lines: Vec<String> = numbered_lines("a\nb\n\nc").collect();
        assert_eq!(lines, vec!["1: a", "2: b", "3: ", "4: c"]);
    }

    #[test]
    fn empty_source_has_no_lines() {
        assert_eq!(numbered_lines("").count(), 0);
    }
}
