//! The fixed stress-test job: a header, six pattern sections separated by tool changes,
//! and a finishing block, scaled to the work envelope.

use nalgebra::Point2;
use rand::Rng;
use tracing::{debug, info};

use crate::error::FontError;
use crate::fonts::Font;
use crate::geometry::{scale_to_envelope, WorkEnvelope};
use crate::patterns::{self, SAFE_Z};
use crate::{xy, z, Program};

pub const MIN_RPM: u32 = 15000;
pub const MAX_RPM: u32 = 24000;

pub fn random_spindle_speed<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    rng.gen_range(MIN_RPM..=MAX_RPM)
}

/// One pattern family with its shape parameters, in unscaled mm.
#[derive(Clone, Debug, PartialEq)]
pub enum Section {
    Spiral {
        center: (f64, f64),
        radius: f64,
        turns: f64,
        operations: usize,
    },
    Grid {
        origin: (f64, f64),
        size: f64,
        count: usize,
        operations: usize,
    },
    Text {
        text: &'static str,
        origin: (f64, f64),
        char_size: f64,
        operations: usize,
    },
    Fractal {
        center: (f64, f64),
        size: f64,
        depth: u32,
        operations: usize,
    },
}

impl Section {
    /// Append this section to `program`, returning the operations it counted.
    pub fn emit(&self, program: &mut Program, font: &Font, rpm: u32) -> usize {
        let point = |(x, y): (f64, f64)| Point2::new(x, y);
        match *self {
            Section::Spiral {
                center,
                radius,
                turns,
                operations,
            } => patterns::spiral(program, point(center), radius, turns, operations, rpm),
            Section::Grid {
                origin,
                size,
                count,
                operations,
            } => patterns::grid(program, point(origin), size, count, operations, rpm),
            Section::Text {
                text,
                origin,
                char_size,
                operations,
            } => font.engrave_text(program, text, point(origin), char_size, operations, rpm),
            Section::Fractal {
                center,
                size,
                depth,
                operations,
            } => patterns::fractal(program, point(center), size, depth, operations, rpm),
        }
    }
}

/// A section, optionally preceded by a tool change.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub tool: Option<(u32, &'static str)>,
    pub section: Section,
}

/// Tool 1 is loaded by the header, so the first step has no change.
pub const STRESS_JOB: &[Step] = &[
    Step {
        tool: None,
        section: Section::Spiral {
            center: (50.0, 50.0),
            radius: 40.0,
            turns: 20.0,
            operations: 2000,
        },
    },
    Step {
        tool: Some((2, "3mm Ball End Mill")),
        section: Section::Grid {
            origin: (10.0, 10.0),
            size: 80.0,
            count: 20,
            operations: 3000,
        },
    },
    Step {
        tool: Some((3, "1/8 V-Bit")),
        section: Section::Spiral {
            center: (150.0, 50.0),
            radius: 30.0,
            turns: 15.0,
            operations: 1500,
        },
    },
    Step {
        tool: Some((4, "0.5mm Engraving Bit")),
        section: Section::Text {
            text: "ghsender",
            origin: (20.0, 120.0),
            char_size: 10.0,
            operations: 1000,
        },
    },
    Step {
        tool: Some((5, "2mm End Mill")),
        section: Section::Fractal {
            center: (150.0, 150.0),
            size: 25.0,
            depth: 4,
            operations: 1500,
        },
    },
    Step {
        tool: Some((6, "4mm Compression Bit")),
        section: Section::Grid {
            origin: (120.0, 10.0),
            size: 60.0,
            count: 15,
            operations: 1000,
        },
    },
];

pub fn header(program: &mut Program, envelope: &WorkEnvelope) {
    program.comment("Complex CNC Router Job - 10K Operations Performance Test");
    program.comment("Generated for graphics rendering performance testing");
    program.comment(&format!(
        "Scaled to Work Area: {}x{}x{}mm",
        envelope.width(),
        envelope.depth(),
        envelope.height()
    ));
    program.comment("Includes multiple toolchanges and spindle speed variations");
    program.raw("G17 G21 G90 G64 P0.025");
    program.rapid(z(SAFE_Z));
    program.tool_change(1, "Load Tool 1 - 6mm End Mill");
    program.rapid(z(10.0));
    program.raw("");
}

pub fn finishing(program: &mut Program) {
    program.comment("===== FINISHING =====");
    program.rapid(z(SAFE_Z));
    program.rapid(xy(0.0, 0.0));
    program.spindle_off();
    program.raw("M30");
}

/// Build `steps` into one unscaled program, drawing a spindle speed per section from `rng`.
pub fn build<R: Rng + ?Sized>(
    steps: &[Step],
    envelope: &WorkEnvelope,
    font: &Font,
    rng: &mut R,
) -> Program {
    let mut program = Program::new();
    header(&mut program, envelope);

    for step in steps {
        if let Some((tool, description)) = step.tool {
            patterns::tool_change(&mut program, tool, description);
        }
        let rpm = random_spindle_speed(&mut *rng);
        let ops = step.section.emit(&mut program, font, rpm);
        debug!(ops, rpm, "Emitted {:?}", step.section);
    }

    finishing(&mut program);
    program
}

/// The full stress-test program, scaled to fit `envelope`.
pub fn generate<R: Rng + ?Sized>(envelope: &WorkEnvelope, rng: &mut R) -> Result<Program, FontError> {
    let font = Font::builtin()?;
    let program = build(STRESS_JOB, envelope, &font, rng);
    info!(commands = program.len(), "Built stress job");
    Ok(scale_to_envelope(&program, envelope))
}
