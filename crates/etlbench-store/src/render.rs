//! Text rendering of fragment results.

use rusqlite::types::ValueRef;

/// Caps applied when rendering query results for the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderLimits {
    pub max_rows: usize,
    pub max_output_chars: usize,
}

impl Default for RenderLimits {
    fn default() -> Self {
        Self {
            max_rows: 50,
            max_output_chars: 8_000,
        }
    }
}

/// Accumulates the per-statement sections of one fragment.
#[derive(Debug, Default)]
pub(crate) struct FragmentOutput {
    sections: Vec<String>,
}

impl FragmentOutput {
    pub(crate) fn push_changes(&mut self, index: usize, changed: usize) {
        self.sections
            .push(format!("[{index}] ok, {changed} row(s) affected"));
    }

    pub(crate) fn push_table(
        &mut self,
        index: usize,
        columns: &[String],
        rows: &[Vec<String>],
        total: usize,
    ) {
        let mut text = format!("[{index}] {}\n", columns.join(" | "));
        for row in rows {
            text.push_str(&row.join(" | "));
            text.push('\n');
        }
        if total > rows.len() {
            text.push_str(&format!("... {} more row(s) not shown\n", total - rows.len()));
        }
        text.push_str(&format!("({total} row(s))"));
        self.sections.push(text);
    }

    pub(crate) fn finish(self, limits: &RenderLimits) -> String {
        if self.sections.is_empty() {
            return "ok, no statements executed".to_string();
        }
        truncate_chars(self.sections.join("\n"), limits.max_output_chars)
    }
}

pub(crate) fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}

fn truncate_chars(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}\n... [output truncated]", &text[..cut]),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_section_reports_hidden_rows() {
        let mut out = FragmentOutput::default();
        let columns = vec!["id".to_string(), "name".to_string()];
        let rows = vec![vec!["1".to_string(), "a".to_string()]];
        out.push_table(1, &columns, &rows, 3);
        let text = out.finish(&RenderLimits::default());

        assert!(text.starts_with("[1] id | name\n1 | a\n"));
        assert!(text.contains("2 more row(s) not shown"));
        assert!(text.ends_with("(3 row(s))"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let text = truncate_chars("ééééé".to_string(), 2);
        assert!(text.starts_with("éé\n"));
        assert!(text.ends_with("[output truncated]"));
    }

    #[test]
    fn test_empty_fragment() {
        let out = FragmentOutput::default();
        assert_eq!(out.finish(&RenderLimits::default()), "ok, no statements executed");
    }

    #[test]
    fn test_render_values() {
        assert_eq!(render_value(ValueRef::Null), "NULL");
        assert_eq!(render_value(ValueRef::Integer(42)), "42");
        assert_eq!(render_value(ValueRef::Text(b"x")), "x");
        assert_eq!(render_value(ValueRef::Blob(&[1, 2])), "<blob 2 bytes>");
    }
}
