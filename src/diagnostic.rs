use crate::span::Span;

/// A compiler diagnostic (error or warning).
///
/// Diagnostics cover mistakes attributable to the input module: calling an
/// external function as if it were internal, mutating state from a
/// read-only context, cyclic internal calls, malformed manifests. Broken
/// compiler invariants are not diagnostics; those panic with a
/// `compiler bug:` message.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn display(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

impl Diagnostic {
    pub fn error(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// Render the diagnostic to stderr using ariadne, pointing into the
    /// module source the manifest was generated from.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let (kind, color) = match self.severity {
            Severity::Error => (ReportKind::Error, Color::Red),
            Severity::Warning => (ReportKind::Warning, Color::Yellow),
        };
        let range = self.span.start as usize..self.span.end as usize;

        let mut report = Report::build(kind, filename, range.start)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, range))
                    .with_message(&self.message)
                    .with_color(color),
            );
        for note in &self.notes {
            report = report.with_note(note);
        }
        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        report
            .finish()
            .eprint((filename, Source::from(source)))
            .unwrap();
    }

    /// Render without source text, for manifests that don't embed it.
    pub fn render_plain(&self, filename: &str) {
        eprintln!("{}: {filename}: {}", self.severity.display(), self.message);
        for note in &self.notes {
            eprintln!("  note: {note}");
        }
        if let Some(help) = &self.help {
            eprintln!("  help: {help}");
        }
    }
}

/// Render a list of diagnostics against the module source, falling back to
/// plain stderr lines when the manifest carries no source text.
pub fn render_diagnostics(diagnostics: &[Diagnostic], filename: &str, source: Option<&str>) {
    for diag in diagnostics {
        match source {
            Some(src) => diag.render(filename, src),
            None => diag.render_plain(filename),
        }
    }
}
