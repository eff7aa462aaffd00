//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, human-readable durations, and Unicode symbols.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use mbuild_lib::sysdeps::Category;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const MINUS: &str = "-";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// Marker for a module in the system dependency report.
pub fn category_symbol(category: Category) -> &'static str {
  match category {
    Category::NewEnough => symbols::SUCCESS,
    Category::TooOldRequired | Category::MissingRequired => symbols::ERROR,
    Category::TooOldOptional | Category::MissingOptional => symbols::MINUS,
    Category::Unknown => symbols::WARNING,
  }
}

pub fn print_category_entry(indent: &str, category: Category, line: &str) {
  let symbol = category_symbol(category);
  let symbol = match category {
    Category::NewEnough => symbol.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    Category::TooOldRequired | Category::MissingRequired => {
      symbol.if_supports_color(Stream::Stdout, |s| s.red()).to_string()
    }
    Category::Unknown => symbol.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
    Category::TooOldOptional | Category::MissingOptional => {
      symbol.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string()
    }
  };
  println!("{}{} {}", indent, symbol, line);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_format_duration() {
    assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
    assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
  }

  #[test]
  fn blocking_categories_are_marked_as_errors() {
    assert_eq!(category_symbol(Category::MissingRequired), symbols::ERROR);
    assert_eq!(category_symbol(Category::TooOldRequired), symbols::ERROR);
    assert_eq!(category_symbol(Category::NewEnough), symbols::SUCCESS);
    assert_eq!(category_symbol(Category::MissingOptional), symbols::MINUS);
  }

  #[test]
  fn output_format_json() {
    assert!(OutputFormat::Json.is_json());
    assert!(!OutputFormat::default().is_json());
  }
}
