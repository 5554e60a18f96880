//! Best-effort diagnostic capture
//!
//! Appends formatted text to a named file. Failures to open or write
//! are swallowed; this is diagnostic plumbing, not orchestration.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Append a line of text to `path`, creating the file if needed.
pub fn append_line(path: &Path, text: &str) {
    let _ = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{}", text));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_lines_in_order() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("kite-trace-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);

        append_line(&path, "first");
        append_line(&path, "second");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first\nsecond\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unwritable_path_is_silent() {
        // Directory path cannot be opened for append; must not panic.
        append_line(Path::new("/"), "ignored");
    }
}
