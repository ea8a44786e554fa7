// ui.rs
use crate::document::DocumentStatus;
use crate::message::Message;
use crate::service::{DocumentUpload, RagService};
use crate::state::TraceStatus;
use crate::trace::TraceId;
use colored::*;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const COLORS: [&str; 6] = ["green", "yellow", "blue", "magenta", "cyan", "bright_red"];

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load(String),
    Ask(String),
    Docs,
    Traces,
    Trace(String),
    Help,
    Exit,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let (word, rest) = match input.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (input, ""),
        };
        match (word, rest.is_empty()) {
            ("", _) => Command::Empty,
            ("load", false) => Command::Load(rest.to_string()),
            ("ask", false) => Command::Ask(rest.to_string()),
            ("trace", false) => Command::Trace(rest.to_string()),
            ("docs", true) => Command::Docs,
            ("traces", true) => Command::Traces,
            ("help", true) => Command::Help,
            ("exit", true) | ("quit", true) => Command::Exit,
            _ => Command::Unknown(input.to_string()),
        }
    }
}

/// MIME type guessed from a file extension.
pub fn file_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("csv") => "text/csv",
        Some("pdf") => "application/pdf",
        Some("md") => "text/markdown",
        Some("json") => "application/json",
        _ => "text/plain",
    }
}

pub struct UI {
    service: Arc<RagService>,
    agent_colors: HashMap<String, String>,
}

impl UI {
    pub fn new(service: Arc<RagService>) -> Self {
        Self {
            service,
            agent_colors: HashMap::new(),
        }
    }

    fn prompt() {
        print!("> ");
        io::stdout().flush().ok();
    }

    fn get_agent_color(&mut self, agent_name: &str) -> ColoredString {
        let next = COLORS[self.agent_colors.len() % COLORS.len()];
        let color = self
            .agent_colors
            .entry(agent_name.to_string())
            .or_insert_with(|| next.to_string());

        match color.as_str() {
            "green" => agent_name.green(),
            "yellow" => agent_name.yellow(),
            "blue" => agent_name.blue(),
            "magenta" => agent_name.magenta(),
            "cyan" => agent_name.cyan(),
            "bright_red" => agent_name.bright_red(),
            _ => agent_name.normal(),
        }
    }

    fn print_help() {
        println!("Commands:");
        println!("  {} <path>      - Ingest a .txt, .md, .csv or .pdf file", "load".green());
        println!("  {} <question>   - Ask a question about the loaded documents", "ask".green());
        println!("  docs             - List documents and their status");
        println!("  traces           - List traces");
        println!("  trace <id>       - Show the messages of one trace");
        println!("  exit             - Quit (Ctrl-C works too)");
    }

    pub async fn run(&mut self) -> io::Result<()> {
        println!("{}", "=== ragbus: document Q&A over a message bus ===".bright_cyan());
        Self::print_help();
        println!();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            Self::prompt();
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                println!();
                break;
            };

            match Command::parse(&line) {
                Command::Empty => {}
                Command::Load(path) => self.load(Path::new(&path)).await,
                Command::Ask(question) => self.ask(&question).await,
                Command::Docs => self.list_documents(),
                Command::Traces => self.list_traces(),
                Command::Trace(id) => self.show_trace(&TraceId::from(id.as_str())),
                Command::Help => Self::print_help(),
                Command::Exit => break,
                Command::Unknown(input) => println!(
                    "{}",
                    format!("Unknown command: {}. Type 'help' for the list.", input).red()
                ),
            }
        }

        println!("Bye.");
        Ok(())
    }

    async fn load(&mut self, path: &Path) {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let file_type = file_type_for(path);

        let content = if file_type == "application/pdf" {
            // No PDF text extraction; ingest a stand-in so the pipeline still runs.
            format!(
                "PDF document {}. Text extraction for PDF files is not available, \
                 so this placeholder stands in for its content.",
                filename
            )
        } else {
            match tokio::fs::read_to_string(path).await {
                Ok(content) => content,
                Err(e) => {
                    println!("{}", format!("Cannot read {}: {}", path.display(), e).red());
                    return;
                }
            }
        };

        let upload = DocumentUpload {
            filename: filename.clone(),
            content,
            file_type: file_type.to_string(),
        };
        match self.service.submit_document(upload) {
            Ok(submission) => println!(
                "Loading {} as {} (trace {})",
                filename.bright_white(),
                submission.document_id.yellow(),
                submission.trace_id
            ),
            Err(e) => println!("{}", format!("Rejected {}: {}", filename, e).red()),
        }
    }

    async fn ask(&mut self, question: &str) {
        println!("{}", "Thinking...".bright_black());
        match self.service.submit_query(question, None).await {
            Ok(response) => {
                println!("\n{}", response.answer);
                if !response.sources.is_empty() {
                    println!("{} {}", "Sources:".bold(), response.sources.join(", "));
                }
                let confidence = format!("{:.0}%", response.confidence);
                let confidence = if response.confidence < 30.0 {
                    confidence.red()
                } else if response.confidence < 70.0 {
                    confidence.yellow()
                } else {
                    confidence.green()
                };
                println!("{} {} ({})\n", "Confidence:".bold(), confidence, response.reasoning);
            }
            Err(e) => println!("{}", format!("Query failed: {}", e).red()),
        }
    }

    fn list_documents(&mut self) {
        let documents = self.service.documents();
        if documents.is_empty() {
            println!("No documents loaded.");
            return;
        }
        for doc in documents {
            let status = match doc.status {
                DocumentStatus::Processing => doc.status.to_string().yellow(),
                DocumentStatus::Ready => doc.status.to_string().green(),
                DocumentStatus::Error => doc.status.to_string().red(),
            };
            println!(
                "{} {} [{}] {} bytes, {}",
                doc.id.bright_black(),
                doc.filename.bright_white(),
                status,
                doc.size_bytes,
                doc.uploaded_at.format("%H:%M:%S")
            );
        }
    }

    fn list_traces(&mut self) {
        let traces = self.service.coordinator().all_traces();
        if traces.is_empty() {
            println!("No traces yet.");
            return;
        }
        for trace in traces {
            println!(
                "{} {} {} ({} messages){}",
                trace.id,
                trace.kind.to_string().bright_black(),
                Self::colored_status(trace.status),
                trace.messages.len(),
                trace
                    .error
                    .map(|e| format!(": {}", e).red().to_string())
                    .unwrap_or_default()
            );
        }
    }

    fn show_trace(&mut self, trace_id: &TraceId) {
        let Some(trace) = self.service.coordinator().trace_status(trace_id) else {
            println!("{}", format!("Unknown trace {}", trace_id).red());
            return;
        };
        println!(
            "{} {} {}",
            trace.id.to_string().bold(),
            trace.kind,
            Self::colored_status(trace.status)
        );
        for message in self.service.coordinator().history(trace_id) {
            self.print_message(&message);
        }
    }

    fn colored_status(status: TraceStatus) -> ColoredString {
        match status {
            TraceStatus::Started | TraceStatus::InProgress => status.to_string().yellow(),
            TraceStatus::Completed => status.to_string().green(),
            TraceStatus::Failed | TraceStatus::TimedOut => status.to_string().red(),
        }
    }

    fn print_message(&mut self, message: &Message) {
        let sender = self.get_agent_color(&message.sender);
        let receiver = self.get_agent_color(&message.receiver);
        let kind = if message.body.is_error() {
            message.kind().red()
        } else {
            message.kind().normal()
        };
        println!(
            "  {} {} -> {} {}",
            message.timestamp.format("%H:%M:%S%.3f").to_string().bright_black(),
            sender,
            receiver,
            kind
        );
        if let Some(failure) = message.body.failure() {
            println!("      {}", failure.reason().red());
        }
    }
}
