//! Exception chains and stack frames.
//!
//! Rust errors carry neither a class name nor a stack trace, so an
//! [`Exception`] is the notifier's own view of a failure: a type name, a
//! message, the frames captured when the failure was observed, and an
//! optional cause. Chains are ordered outer-first.
//!
//! Capturing from a live `std::error::Error` is best-effort. The root type
//! name comes from `std::any::type_name`, nested sources are named from the
//! leading identifier of their `Debug` output, and frames come from parsing
//! a forced `std::backtrace::Backtrace`. None of this can fail: unknown data
//! simply leaves fields empty.

use std::{
    backtrace::{Backtrace, BacktraceStatus},
    error::Error,
    fmt::Write as _,
    iter::FusedIterator,
};

use serde::{Deserialize, Serialize};

/// Maximum number of `source()` links followed when capturing an error.
const MAX_CAPTURED_CAUSES: usize = 32;

/// Fallback name for errors whose type cannot be recovered.
const UNKNOWN_ERROR_CLASS: &str = "Error";

/// Type path prefixes of frames that belong to capture and reporting
/// entry points rather than to the caller.
const CAPTURE_FRAME_PREFIXES: &[&str] = &[
    "std::backtrace",
    "std::backtrace_rs",
    "badger_core::exception",
    "badger_core::event",
    "badger_client::notifier",
];


/// A single frame of a captured call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Source line number, `0` when unknown.
    pub line: u32,
    /// Source file, when known.
    pub file: Option<String>,
    /// Declaring type or module path of the function.
    pub type_name: Option<String>,
    /// Bare function or method name.
    pub method: String,
}

impl StackFrame {
    /// Creates a frame for `type_name.method` with no location.
    pub fn new(type_name: impl Into<String>, method: impl Into<String>) -> Self {
        Self { line: 0, file: None, type_name: Some(type_name.into()), method: method.into() }
    }

    /// Creates a frame for a free function with no declaring type.
    pub fn function(method: impl Into<String>) -> Self {
        Self { line: 0, file: None, type_name: None, method: method.into() }
    }

    /// Sets the source location of the frame.
    #[must_use]
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self
    }

    /// Method name qualified with its declaring type, `Type.method`.
    pub fn qualified_method(&self) -> String {
        match self.type_name.as_deref() {
            Some(type_name) if !type_name.is_empty() => format!("{type_name}.{}", self.method),
            _ => self.method.clone(),
        }
    }

    fn location(&self) -> String {
        match (self.file.as_deref(), self.line) {
            (Some(file), 0) => file.to_string(),
            (Some(file), line) => format!("{file}:{line}"),
            (None, _) => "Unknown Source".to_string(),
        }
    }
}

/// An error with its frames and cause chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exception {
    class_name: String,
    message: Option<String>,
    frames: Vec<StackFrame>,
    cause: Option<Box<Exception>>,
}

impl Exception {
    /// Creates an exception of the given class with no message or frames.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self { class_name: class_name.into(), message: None, frames: Vec::new(), cause: None }
    }

    /// Sets the exception message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Appends one frame, innermost first.
    #[must_use]
    pub fn with_frame(mut self, frame: StackFrame) -> Self {
        self.frames.push(frame);
        self
    }

    /// Appends frames, innermost first.
    #[must_use]
    pub fn with_frames(mut self, frames: impl IntoIterator<Item = StackFrame>) -> Self {
        self.frames.extend(frames);
        self
    }

    /// Sets the direct cause of this exception.
    #[must_use]
    pub fn caused_by(mut self, cause: Exception) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Captures a live error, its `source()` chain and the current call
    /// stack.
    pub fn capture<E: Error + 'static>(error: &E) -> Self {
        Self::from_source_chain(std::any::type_name::<E>().to_string(), error, 0)
            .with_frames(frames_from_backtrace(&Backtrace::force_capture()))
    }

    /// Captures a type-erased error such as the contents of a
    /// `Box<dyn Error>`.
    ///
    /// The root is named from its `Debug` output, like nested sources.
    pub fn capture_dyn(error: &(dyn Error + 'static)) -> Self {
        Self::from_source_chain(debug_type_name(error), error, 0)
            .with_frames(frames_from_backtrace(&Backtrace::force_capture()))
    }

    fn from_source_chain(class_name: String, error: &(dyn Error + 'static), depth: usize) -> Self {
        let mut exception = Self::new(class_name).with_message(error.to_string());
        if depth < MAX_CAPTURED_CAUSES {
            if let Some(source) = error.source() {
                let cause = Self::from_source_chain(debug_type_name(source), source, depth + 1);
                exception.cause = Some(Box::new(cause));
            }
        }
        exception
    }

    /// Fully qualified class (type) name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Message of this exception, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Frames of this exception, innermost first.
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// Direct cause, if any.
    pub fn cause(&self) -> Option<&Exception> {
        self.cause.as_deref()
    }

    /// Iterates the chain outer-first, starting with `self`.
    pub fn chain(&self) -> Chain<'_> {
        Chain { next: Some(self) }
    }

    /// `Class: message`, or just `Class` without a message.
    pub fn headline(&self) -> String {
        match self.message.as_deref() {
            Some(message) => format!("{}: {message}", self.class_name),
            None => self.class_name.clone(),
        }
    }

    /// Renders the full chain in the conventional multi-line trace form.
    ///
    /// ```text
    /// app::Error: boom
    /// 	at app::handler.run(src/handler.rs:12)
    /// Caused by: Os: No such file or directory
    /// ```
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (index, exception) in self.chain().enumerate() {
            let prefix = if index == 0 { "" } else { "Caused by: " };
            let _ = writeln!(out, "{prefix}{}", exception.headline());
            for frame in &exception.frames {
                let _ = writeln!(out, "\tat {}({})", frame.qualified_method(), frame.location());
            }
        }
        out
    }
}

/// Outer-first iterator over an exception chain.
#[derive(Debug, Clone)]
pub struct Chain<'a> {
    next: Option<&'a Exception>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a Exception;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.cause();
        Some(current)
    }
}

impl FusedIterator for Chain<'_> {}

/// Names a type-erased error from the leading identifier of its `Debug`
/// output, e.g. `ParseIntError { kind: InvalidDigit }` becomes
/// `ParseIntError`.
fn debug_type_name(error: &(dyn Error + 'static)) -> String {
    let debug = format!("{error:?}");
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();

    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        UNKNOWN_ERROR_CLASS.to_string()
    } else {
        name
    }
}

/// Extracts frames from a captured backtrace, dropping the frames of the
/// capture machinery itself.
pub fn frames_from_backtrace(backtrace: &Backtrace) -> Vec<StackFrame> {
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    parse_backtrace(&backtrace.to_string())
}

/// Parses the `Display` form of a `std::backtrace::Backtrace`.
///
/// Symbol lines look like `  3: app::handler::run` and are optionally
/// followed by `at src/handler.rs:12:5`. Anything else is ignored.
pub fn parse_backtrace(text: &str) -> Vec<StackFrame> {
    let mut frames: Vec<StackFrame> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(location) = trimmed.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                apply_location(frame, location);
            }
            continue;
        }

        if let Some((index, symbol)) = trimmed.split_once(": ") {
            if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
                frames.push(frame_from_symbol(symbol.trim()));
            }
        }
    }

    let machinery = frames.iter().take_while(|frame| is_capture_frame(frame)).count();
    frames.drain(..machinery);
    frames
}

fn is_capture_frame(frame: &StackFrame) -> bool {
    frame
        .type_name
        .as_deref()
        .is_some_and(|name| CAPTURE_FRAME_PREFIXES.iter().any(|prefix| name.starts_with(prefix)))
}

fn apply_location(frame: &mut StackFrame, location: &str) {
    let mut parts = location.rsplitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_column), Some(line), Some(file)) => match line.parse::<u32>() {
            Ok(line) => {
                frame.file = Some(file.to_string());
                frame.line = line;
            },
            Err(_) => frame.file = Some(location.to_string()),
        },
        _ => frame.file = Some(location.to_string()),
    }
}

fn frame_from_symbol(symbol: &str) -> StackFrame {
    let symbol = strip_closure_segments(strip_symbol_hash(symbol));

    // Split on the last `::` outside generic brackets.
    let bytes = symbol.as_bytes();
    let mut depth = 0i32;
    let mut split_at = None;
    let mut i = 0;
    while i + 1 < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' => depth -= 1,
            b':' if depth <= 0 && bytes[i + 1] == b':' => {
                split_at = Some(i);
                i += 1;
            },
            _ => {},
        }
        i += 1;
    }

    match split_at {
        Some(at) => StackFrame::new(&symbol[..at], &symbol[at + 2..]),
        None => StackFrame::function(symbol),
    }
}

/// Attributes closures and async bodies to their enclosing function:
/// `app::run::{{closure}}` (or `{closure#0}`) becomes `app::run`.
fn strip_closure_segments(mut symbol: &str) -> &str {
    while let Some((enclosing, last)) = symbol.rsplit_once("::") {
        if last == "{{closure}}" || last.starts_with("{closure#") {
            symbol = enclosing;
        } else {
            break;
        }
    }
    symbol
}

/// Drops a trailing `::h0123456789abcdef` legacy mangling hash.
fn strip_symbol_hash(symbol: &str) -> &str {
    match symbol.rsplit_once("::h") {
        Some((head, hash)) if hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()) => {
            head
        },
        _ => symbol,
    }
}
