use std::fs::OpenOptions;
use std::io::{BufWriter, Result, Write};
use std::path::Path;

pub mod error;
pub mod fonts;
pub mod geometry;
pub mod job;
pub mod patterns;

pub use error::{EnvelopeError, FontError};
pub use geometry::WorkEnvelope;

/// Absolute target of a straight move. Axes left as `None` keep the machine's prior position.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

pub fn xy(x: f64, y: f64) -> Position {
    Position {
        x: Some(x),
        y: Some(y),
        z: None,
    }
}

pub fn xyz(x: f64, y: f64, z: f64) -> Position {
    Position {
        x: Some(x),
        y: Some(y),
        z: Some(z),
    }
}

pub fn z(z: f64) -> Position {
    Position {
        x: None,
        y: None,
        z: Some(z),
    }
}

/// Arc endpoint plus the centre offset from the arc's start point.
/// X, Y are absolute; I, J are relative and so are never translated.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ArcEnd {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub i: Option<f64>,
    pub j: Option<f64>,
}

pub fn xyij(x: f64, y: f64, i: f64, j: f64) -> ArcEnd {
    ArcEnd {
        x: Some(x),
        y: Some(y),
        i: Some(i),
        j: Some(j),
    }
}

/// One line of the output program. Each kind carries exactly the words it may emit.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// G0
    Rapid(Position),
    /// G1
    Linear { to: Position, feed: Option<f64> },
    /// G2, clockwise
    Arc { to: ArcEnd, feed: Option<f64> },
    /// M3
    SpindleOn { rpm: u32 },
    /// M5
    SpindleOff,
    /// M6
    ToolChange { tool: u32, comment: Option<String> },
    /// G4, seconds
    Dwell { seconds: f64 },
    Comment(String),
    Raw(String),
}

impl Command {
    fn keyword(&self) -> &'static str {
        match self {
            Command::Rapid(_) => "G0",
            Command::Linear { .. } => "G1",
            Command::Arc { .. } => "G2",
            Command::SpindleOn { .. } => "M3",
            Command::SpindleOff => "M5",
            Command::ToolChange { .. } => "M6",
            Command::Dwell { .. } => "G4",
            Command::Comment(_) | Command::Raw(_) => "",
        }
    }

    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            Command::Rapid(_) | Command::Linear { .. } | Command::Arc { .. }
        )
    }

    /// Absolute coordinates carried by this command, if any.
    pub fn position(&self) -> Option<Position> {
        match self {
            Command::Rapid(p) | Command::Linear { to: p, .. } => Some(*p),
            Command::Arc { to, .. } => Some(Position {
                x: to.x,
                y: to.y,
                z: None,
            }),
            _ => None,
        }
    }
}

/// Counts reported once a program has been built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgramStats {
    pub motion: usize,
    pub tool_changes: usize,
    pub spindle_starts: usize,
}

/// The command buffer. Generators append to it top to bottom, the scaler rewrites it,
/// and the serializer walks it once.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    commands: Vec<Command>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn comment(&mut self, s: &str) {
        self.push(Command::Comment(s.to_string()));
    }

    pub fn raw(&mut self, s: &str) {
        self.push(Command::Raw(s.to_string()));
    }

    pub fn rapid(&mut self, p: Position) {
        self.push(Command::Rapid(p));
    }

    pub fn linear(&mut self, p: Position, feed: Option<f64>) {
        self.push(Command::Linear { to: p, feed });
    }

    pub fn arc(&mut self, p: ArcEnd, feed: Option<f64>) {
        self.push(Command::Arc { to: p, feed });
    }

    pub fn spindle_on(&mut self, rpm: u32) {
        self.push(Command::SpindleOn { rpm });
    }

    pub fn spindle_off(&mut self) {
        self.push(Command::SpindleOff);
    }

    pub fn tool_change(&mut self, tool: u32, comment: &str) {
        self.push(Command::ToolChange {
            tool,
            comment: Some(comment.to_string()),
        });
    }

    pub fn dwell(&mut self, seconds: f64) {
        self.push(Command::Dwell { seconds });
    }

    pub fn stats(&self) -> ProgramStats {
        self.commands
            .iter()
            .fold(ProgramStats::default(), |mut stats, c| {
                match c {
                    c if c.is_motion() => stats.motion += 1,
                    Command::ToolChange { .. } => stats.tool_changes += 1,
                    Command::SpindleOn { .. } => stats.spindle_starts += 1,
                    _ => {}
                }
                stats
            })
    }

    /// Serialize the whole program. Feed rate is modal: `F` is only written when it changes.
    pub fn write_gcode(&self, file: &mut dyn Write) -> Result<()> {
        let mut modal = ModalState::default();
        for command in &self.commands {
            modal.write_command(file, command)?;
        }
        Ok(())
    }

    /// Write the program to `path`, replacing any existing file.
    pub fn write_to_path(&self, path: &Path) -> Result<()> {
        let mut file = BufWriter::new(
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
        );
        self.write_gcode(&mut file)?;
        file.flush()
    }

    pub fn to_gcode(&self) -> String {
        let mut buf = Vec::new();
        self.write_gcode(&mut buf).expect("writing to a Vec is infallible");
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl From<Vec<Command>> for Program {
    fn from(commands: Vec<Command>) -> Self {
        Program { commands }
    }
}

/// State carried across lines during one serialization pass.
#[derive(Debug, Default)]
struct ModalState {
    feed: Option<f64>,
}

impl ModalState {
    fn write_command(&mut self, file: &mut dyn Write, command: &Command) -> Result<()> {
        let mut inline_comment = None;
        match command {
            Command::Comment(text) => return writeln!(file, "; {text}"),
            Command::Raw(text) => return writeln!(file, "{text}"),
            _ => write!(file, "{}", command.keyword())?,
        }
        match command {
            Command::ToolChange { tool, comment } => {
                write!(file, " T{tool}")?;
                inline_comment = comment.as_deref();
            }
            Command::SpindleOn { rpm } => write!(file, " S{rpm}")?,
            Command::Dwell { seconds } => write!(file, " P{seconds:.1}")?,
            Command::Rapid(p) => p.as_gvals(file)?,
            Command::Linear { to, feed } => {
                to.as_gvals(file)?;
                self.feed(file, *feed)?;
            }
            Command::Arc { to, feed } => {
                to.as_gvals(file)?;
                self.feed(file, *feed)?;
            }
            _ => {}
        }
        if let Some(text) = inline_comment.filter(|t| !t.is_empty()) {
            write!(file, "  ; {text}")?;
        }
        writeln!(file)
    }

    fn feed(&mut self, file: &mut dyn Write, feed: Option<f64>) -> Result<()> {
        if let Some(f) = feed {
            if self.feed != Some(f) {
                write!(file, " F{f}")?;
                self.feed = Some(f);
            }
        }
        Ok(())
    }
}

trait AsGVals {
    fn as_gvals(&self, file: &mut dyn Write) -> Result<()>;
}

impl AsGVals for Position {
    fn as_gvals(&self, file: &mut dyn Write) -> Result<()> {
        g_val(file, "X", self.x)?;
        g_val(file, "Y", self.y)?;
        g_val(file, "Z", self.z)?;
        Ok(())
    }
}

impl AsGVals for ArcEnd {
    fn as_gvals(&self, file: &mut dyn Write) -> Result<()> {
        g_val(file, "X", self.x)?;
        g_val(file, "Y", self.y)?;
        g_val(file, "I", self.i)?;
        g_val(file, "J", self.j)?;
        Ok(())
    }
}

/// Emit a coordinate word, if `ov` is `Some`, in fixed three-decimal form.
fn g_val(file: &mut dyn Write, name: &str, ov: Option<f64>) -> Result<()> {
    match ov {
        Some(v) => write!(file, " {name}{v:.3}"),
        None => Ok(()),
    }
}
