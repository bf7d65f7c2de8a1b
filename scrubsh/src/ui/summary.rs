// scrubsh/src/ui/summary.rs
//! Per-rule redaction summary printed after a run.

use std::collections::BTreeSet;
use std::io::{self, Write};

use owo_colors::OwoColorize;
use scrubsh_core::LedgerSnapshot;

/// Writes one line per rule: occurrence count, files touched and whether the
/// rule is built in. Rules are listed by name.
pub fn print_summary<W: Write + ?Sized>(snapshot: &LedgerSnapshot, writer: &mut W, use_color: bool) -> io::Result<()> {
    if snapshot.is_empty() {
        writeln!(writer, "No secrets were redacted.")?;
        return Ok(());
    }

    let header = "Redaction Summary:";
    if use_color {
        writeln!(writer, "{}", header.bold())?;
    } else {
        writeln!(writer, "{}", header)?;
    }

    for (rule, hits) in &snapshot.by_redactor {
        let files: BTreeSet<&str> = hits.iter().map(|r| r.file.as_str()).collect();
        let builtin = if hits.iter().all(|r| r.is_default_redactor) { " [built-in]" } else { "" };
        let counts = format!("{} occurrence(s) in {} file(s)", hits.len(), files.len());
        if use_color {
            writeln!(writer, "  {}: {}{}", rule.cyan(), counts.yellow(), builtin)?;
        } else {
            writeln!(writer, "  {}: {}{}", rule, counts, builtin)?;
        }
    }

    writeln!(
        writer,
        "Total: {} redaction(s) across {} file(s)",
        snapshot.total(),
        snapshot.by_file.len()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrubsh_core::Redaction;

    fn hit(rule: &str, file: &str, builtin: bool) -> Redaction {
        Redaction::new(rule, 10, 4, 1, file, builtin)
    }

    #[test]
    fn test_empty_snapshot() {
        let mut out = Vec::new();
        print_summary(&LedgerSnapshot::default(), &mut out, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No secrets were redacted.\n");
    }

    #[test]
    fn test_rules_are_listed_with_counts() {
        let mut snapshot = LedgerSnapshot::default();
        snapshot.by_redactor.insert(
            "password env pair".to_string(),
            vec![hit("password env pair", "a.json", true), hit("password env pair", "b.json", true)],
        );
        snapshot.by_redactor.insert("custom".to_string(), vec![hit("custom", "a.json", false)]);
        snapshot.by_file.insert("a.json".to_string(), vec![hit("custom", "a.json", false)]);
        snapshot.by_file.insert("b.json".to_string(), vec![]);

        let mut out = Vec::new();
        print_summary(&snapshot, &mut out, false).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("  custom: 1 occurrence(s) in 1 file(s)\n"), "{}", text);
        assert!(text.contains("  password env pair: 2 occurrence(s) in 2 file(s) [built-in]\n"), "{}", text);
        assert!(text.contains("Total: 3 redaction(s) across 2 file(s)"), "{}", text);
    }
}
