use console::style;

/// Styled terminal lines for command results.
pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// `label: value` with a dimmed label
    pub fn field(&self, label: &str, value: impl std::fmt::Display) {
        println!("  {} {}", style(format!("{}:", label)).dim(), value);
    }

    /// Section listing `items`, skipped entirely when empty
    pub fn list<T: std::fmt::Display>(&self, title: &str, items: &[T]) {
        if items.is_empty() {
            return;
        }
        self.section(&format!("{} ({})", title, items.len()));
        for item in items {
            println!("  • {}", item);
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
