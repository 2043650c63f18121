use super::Diagnostic;

pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn bold(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold_red(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1;31m{s}\x1b[0m") } else { s.to_string() }
    }

    fn cyan(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[36m{s}\x1b[0m") } else { s.to_string() }
    }

    /// `luna(file:line): <phase> error in <context>, <message>`, then the
    /// offending source line when attached.
    pub fn render(&self, d: &Diagnostic) -> String {
        let location = match d.line {
            Some(line) => format!("luna({}:{line}):", d.filename),
            None => format!("luna({}):", d.filename),
        };
        let mut out = format!("{} {}", self.bold(&location), self.bold_red(&format!("{} error", d.phase)));
        if let Some(context) = &d.context {
            out.push_str(&format!(" in {}", self.cyan(context)));
        }
        out.push_str(&format!(", {}\n", d.message));

        if let (Some(line), Some(text)) = (d.line, &d.source_line) {
            let gutter = line.to_string().len();
            let pipe = self.cyan("|");
            let line_num = self.cyan(&format!("{line:>gutter$}"));
            out.push_str(&format!("  {line_num} {pipe} {text}\n"));
        }

        out
    }
}
