//! Shared CLI helpers: banner, streamed output, capability listing.

use std::io::Write;
use std::path::Path;

use colored::Colorize;
use serde_json::Value;

use toolwire_agent::ResponseSink;
use toolwire_client::ServerInfo;
use toolwire_core::types::ToolCall;
use toolwire_core::utils::truncate_string;
use toolwire_core::{CapabilityDescriptor, InvocationResult};

/// Argument previews in tool-call notices are cut to this many characters.
const ARGS_PREVIEW: usize = 80;

/// Show a path with the home directory collapsed to `~`.
pub fn display_path(path: &Path) -> String {
    if let Some(home) = dirs_next::home_dir() {
        if let Ok(rest) = path.strip_prefix(&home) {
            return format!("~/{}", rest.display());
        }
    }
    path.display().to_string()
}

/// Print the banner shown at REPL start.
pub fn print_banner(server: &ServerInfo, tools: usize, model: &str) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "🔧 Toolwire".cyan().bold(), version.dimmed());
    println!(
        "{}",
        format!(
            "Connected to {} {} · {} tools · model {}",
            server.name, server.version, tools, model
        )
        .dimmed()
    );
    println!("{}", "Type a message, or \"exit\" to quit.".dimmed());
    println!();
}

/// One-line summary of the connected backend.
pub fn print_server(server: &ServerInfo, tools: usize) {
    println!();
    println!(
        "{} {} {} (protocol {})",
        "🔧".cyan(),
        server.name.bold(),
        server.version.dimmed(),
        server.protocol_version
    );
    println!("{}", format!("{tools} tools").dimmed());
    println!();
}

/// Print one discovered capability with its parameters.
pub fn print_capability(descriptor: &CapabilityDescriptor) {
    println!("  {}", descriptor.name.green().bold());
    if !descriptor.description.is_empty() {
        println!("    {}", descriptor.description);
    }
    for line in parameter_lines(descriptor) {
        println!("    {}", line.dimmed());
    }
    println!();
}

/// `name: type (required)` per declared parameter.
fn parameter_lines(descriptor: &CapabilityDescriptor) -> Vec<String> {
    let required = descriptor.required_parameters();
    let Some(properties) = descriptor
        .input_schema
        .get("properties")
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };

    properties
        .iter()
        .map(|(name, schema)| {
            let kind = schema.get("type").and_then(Value::as_str).unwrap_or("any");
            let mut line = format!("{name}: {kind}");
            if required.contains(&name.as_str()) {
                line.push_str(" (required)");
            }
            if let Some(desc) = schema.get("description").and_then(Value::as_str) {
                line.push_str(&format!(" — {desc}"));
            }
            line
        })
        .collect()
}

/// Print a dimmed informational line.
pub fn print_notice(text: &str) {
    println!("{}", text.dimmed());
}

/// Print an error line to stderr.
pub fn print_error(text: &str) {
    eprintln!("\n{} {text}\n", "❌ Error:".red().bold());
}

// ─────────────────────────────────────────────
// Streamed output
// ─────────────────────────────────────────────

/// Prints a turn as it happens: answer text inline, tool activity dimmed.
pub struct StreamPrinter {
    thinking: bool,
    /// Whether answer text is mid-line.
    in_text: bool,
    printed_label: bool,
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self {
            thinking: false,
            in_text: false,
            printed_label: false,
        }
    }

    /// Show a placeholder until the first output arrives.
    pub fn thinking(&mut self) {
        eprint!("{}", "⠿ thinking...".dimmed());
        self.thinking = true;
    }

    /// End the turn's output.
    pub fn finish(&mut self) {
        self.clear_thinking();
        if self.in_text {
            println!();
        }
        println!();
        self.in_text = false;
        self.printed_label = false;
    }

    /// Drop the placeholder without ending a turn.
    pub fn clear_thinking(&mut self) {
        if self.thinking {
            eprint!("\r{}\r", " ".repeat(40));
            self.thinking = false;
        }
    }

    fn label(&mut self) {
        if !self.printed_label {
            println!();
            println!("{}", "🤖 Assistant".cyan().bold());
            self.printed_label = true;
        }
    }

    fn end_text_line(&mut self) {
        if self.in_text {
            println!();
            self.in_text = false;
        }
    }
}

impl Default for StreamPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSink for StreamPrinter {
    fn on_text(&mut self, text: &str) {
        self.clear_thinking();
        self.label();
        print!("{text}");
        let _ = std::io::stdout().flush();
        self.in_text = !text.ends_with('\n');
    }

    fn on_tool_call(&mut self, call: &ToolCall) {
        self.clear_thinking();
        self.label();
        self.end_text_line();
        println!("{}", format_tool_call(call).dimmed());
    }

    fn on_tool_result(&mut self, name: &str, result: &InvocationResult) {
        self.clear_thinking();
        if result.is_error {
            let reason = truncate_string(&result.to_text(), ARGS_PREVIEW);
            println!("{}", format!("  ✗ {name}: {reason}").red());
        } else {
            println!("{}", format!("  ✓ {name}").green());
        }
        self.thinking();
    }
}

/// `  ↳ name({"owner":"x"})`, arguments shortened.
fn format_tool_call(call: &ToolCall) -> String {
    format!(
        "  ↳ {}({})",
        call.function.name,
        truncate_string(&call.function.arguments, ARGS_PREVIEW)
    )
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
