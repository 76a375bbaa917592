use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser as ClapParser, ValueEnum};
use serde_json::{json, Value};

use cachectl::analysis::analyze;
use cachectl::batch::{self, BatchReport};
use cachectl::grammar;
use cachectl::parser::{Parser, TraceLog};
use cachectl::render::Render;
use cachectl::RegisterSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Checks files of cache-control instructions, one per line.
#[derive(ClapParser, Debug)]
#[command(name = "cachectl", version, about)]
struct Cli {
    /// Source files. Standard input is read when neither files nor --line are given.
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,
    /// Check TEXT as a single line. May be repeated.
    #[arg(short = 'e', long = "line", value_name = "TEXT")]
    lines: Vec<String>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Print the AST of each instruction.
    #[arg(long, action = ArgAction::SetTrue)]
    tree: bool,
    /// Print the full parse tree and the leftmost derivation.
    #[arg(long, action = ArgAction::SetTrue)]
    derivation: bool,
    /// Print every shift and reduce step.
    #[arg(long, action = ArgAction::SetTrue)]
    trace: bool,
    /// Print a summary of each instruction.
    #[arg(long, action = ArgAction::SetTrue)]
    analyze: bool,
    /// Print the grammar rules and the action/goto table, then exit.
    #[arg(long, action = ArgAction::SetTrue)]
    table: bool,
    /// Only recognize the eight classic E/R registers.
    #[arg(long, action = ArgAction::SetTrue)]
    classic_registers: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    no_color: bool,
}

impl Cli {
    fn registers(&self) -> RegisterSet {
        if self.classic_registers {
            RegisterSet::Classic
        } else {
            RegisterSet::Extended
        }
    }
}

struct Source {
    origin: String,
    text: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.table {
        print!("{}\n{}", grammar::render_rules(), grammar::render_table());
        return Ok(());
    }

    let sources = read_sources(&cli)?;
    let mut failed = false;
    let mut json_reports = Vec::new();

    for source in sources.iter() {
        let report = batch::parse_source(&source.text, cli.registers());
        failed |= !report.is_ok();
        match cli.format {
            OutputFormat::Text => print_text(&cli, source, &report),
            OutputFormat::Json => json_reports.push(json_report(&cli, source, &report)),
        }
    }

    if cli.format == OutputFormat::Json {
        let out = serde_json::to_string_pretty(&Value::Array(json_reports))
            .context("failed to serialize the report")?;
        println!("{}", out);
    }

    if failed {
        process::exit(1);
    }
    Ok(())
}

fn read_sources(cli: &Cli) -> Result<Vec<Source>> {
    let mut sources = Vec::new();
    for path in cli.files.iter() {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        sources.push(Source { origin: path.display().to_string(), text });
    }
    for line in cli.lines.iter() {
        sources.push(Source { origin: "<line>".to_string(), text: line.clone() });
    }
    if sources.is_empty() {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).context("failed to read standard input")?;
        sources.push(Source { origin: "<stdin>".to_string(), text });
    }
    Ok(sources)
}

fn trace_line(cli: &Cli, line: usize, text: &str) -> TraceLog {
    let mut log = TraceLog::default();
    // The result was already reported by the batch; only the steps matter here.
    let _ = Parser::new()
        .with_registers(cli.registers())
        .starting_at_line(line)
        .with_tracer(&mut log)
        .parse(text);
    log
}

fn print_text(cli: &Cli, source: &Source, report: &BatchReport) {
    let color = !cli.no_color && io::stderr().is_terminal();
    let mut entries: Vec<(usize, Result<usize, usize>)> = report.parsed.iter().enumerate()
        .map(|(index, parsed)| (parsed.line, Ok(index)))
        .chain(report.failed.iter().enumerate().map(|(index, failed)| (failed.line, Err(index))))
        .collect();
    entries.sort_by_key(|(line, _)| *line);

    for (line, entry) in entries {
        match entry {
            Ok(index) => {
                let parsed = &report.parsed[index];
                let instruction = &parsed.instruction;
                println!("{}:{}: {} ({})", source.origin, line, instruction, instruction.category());
                if cli.tree {
                    println!("{}\n", instruction.to_tree_text());
                }
                if cli.derivation {
                    println!("{}\n", instruction.parse_tree_text());
                    for (index, step) in instruction.derivation_steps().iter().enumerate() {
                        let arrow = if index == 0 { "  " } else { "⇒ " };
                        println!("{}{}", arrow, step);
                    }
                    println!();
                }
                if cli.analyze {
                    println!("{}", analyze(instruction));
                }
                if cli.trace {
                    println!("{}", trace_line(cli, line, &parsed.text));
                }
            }
            Err(index) => {
                let failed = &report.failed[index];
                eprintln!("{}\n", failed.error.render(&failed.text, Some(&source.origin), color));
                if cli.trace {
                    println!("{}", trace_line(cli, line, &failed.text));
                }
            }
        }
    }

    println!("{}: {}", source.origin, report);
}

fn json_report(cli: &Cli, source: &Source, report: &BatchReport) -> Value {
    let parsed: Vec<Value> = report.parsed.iter()
        .map(|parsed| {
            let mut entry = json!({
                "line": parsed.line,
                "text": parsed.text,
                "instruction": parsed.instruction.to_structured(),
            });
            if cli.tree {
                entry["tree"] = json!(parsed.instruction.to_tree_text());
            }
            if cli.derivation {
                entry["derivation"] = json!(parsed.instruction.derivation_steps());
            }
            if cli.analyze {
                entry["analysis"] = json!(analyze(&parsed.instruction));
            }
            entry
        })
        .collect();

    let failed: Vec<Value> = report.failed.iter()
        .map(|failed| json!({
            "line": failed.line,
            "text": failed.text,
            "error": failed.error.to_string(),
            "hint": failed.error.hint().map(|hint| hint.to_string()),
        }))
        .collect();

    json!({
        "origin": source.origin,
        "parsed": parsed,
        "failed": failed,
    })
}
