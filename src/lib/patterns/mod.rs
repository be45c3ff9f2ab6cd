use core::f64;

use nalgebra::{Point2, Vector2};
use tracing::debug;

use crate::{xy, xyij, xyz, z, Program};

/// Clearance height for retracts between sections
pub const SAFE_Z: f64 = 25.0;
/// Feed for plunging into the stock
pub const PLUNGE_FEED: f64 = 300.0;

const SPIRAL_FEED: f64 = 1000.0;
const GRID_FEED: f64 = 800.0;
const GRID_DEPTH: f64 = -1.0;
const FRACTAL_FEED: f64 = 600.0;
const FRACTAL_DEPTH: f64 = -1.0;
/// Radial base segments making up the fractal star
const KOCH_ARMS: usize = 6;
/// sin(60°), used to raise the Koch peak off the middle third
const SQRT_3_2: f64 = 0.866_025_403_784_438_6;

/// Comment, start the spindle and wait for it to come up to speed.
pub fn begin_section(program: &mut Program, title: &str, rpm: u32) {
    debug!(rpm, "Starting section {title}");
    program.comment(&format!("===== {title} ====="));
    program.spindle_on(rpm);
    program.dwell(2.0);
}

/// Retract, stop the spindle and leave a blank line.
pub fn end_section(program: &mut Program) {
    program.rapid(z(SAFE_Z));
    program.spindle_off();
    program.raw("");
}

/// Raise the tool, go home, stop and swap to `tool`.
pub fn tool_change(program: &mut Program, tool: u32, description: &str) {
    program.comment(&format!("===== TOOL CHANGE TO T{tool} ====="));
    program.rapid(z(SAFE_Z));
    program.rapid(xy(0.0, 0.0));
    program.spindle_off();
    program.dwell(3.0);
    program.tool_change(tool, &format!("Change to Tool {tool} - {description}"));
    program.dwell(5.0);
    program.raw("");
}

/// Archimedean spiral out from `center`, getting deeper as it goes.
/// Emits exactly `operations` steps and returns that count.
pub fn spiral(
    program: &mut Program,
    center: Point2<f64>,
    radius: f64,
    turns: f64,
    operations: usize,
    rpm: u32,
) -> usize {
    begin_section(
        program,
        &format!("SPIRAL PATTERN - {operations} operations"),
        rpm,
    );

    let n = operations as f64;
    let angle_step = turns * f64::consts::TAU / n;
    let radius_step = radius / n;

    for i in 0..operations {
        let step = i as f64;
        let angle = step * angle_step;
        let p = center + Vector2::new(angle.cos(), angle.sin()) * (step * radius_step);
        let depth = -0.5 - (step / n) * 1.5;

        if i == 0 {
            program.rapid(xy(p.x, p.y));
            program.linear(z(depth), Some(PLUNGE_FEED));
        } else {
            program.linear(xyz(p.x, p.y, depth), Some(SPIRAL_FEED));
        }
    }

    end_section(program);
    operations
}

/// The small shape cut into each grid cell, cycling cell by cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CellPattern {
    Square,
    Circle,
    Triangle,
    Wave,
}

impl CellPattern {
    fn for_cell(cell: usize) -> Self {
        match cell % 4 {
            0 => CellPattern::Square,
            1 => CellPattern::Circle,
            2 => CellPattern::Triangle,
            _ => CellPattern::Wave,
        }
    }

    /// Cut this pattern with its lower left corner at `corner`. Returns the operations used.
    fn emit(self, program: &mut Program, corner: Point2<f64>, step: f64) -> usize {
        let (x, y) = (corner.x, corner.y);
        let half = step / 2.0;
        match self {
            CellPattern::Square => {
                program.linear(xy(x + half, y), Some(GRID_FEED));
                program.linear(xy(x + half, y + half), None);
                program.linear(xy(x, y + half), None);
                program.linear(xy(x, y), None);
                4
            }
            CellPattern::Circle => {
                let r = step / 4.0;
                let c = corner + Vector2::new(r, r);
                program.rapid(xy(c.x + r, c.y));
                program.arc(xyij(c.x, c.y + r, -r, 0.0), None);
                program.arc(xyij(c.x - r, c.y, 0.0, -r), None);
                program.arc(xyij(c.x, c.y - r, r, 0.0), None);
                program.arc(xyij(c.x + r, c.y, 0.0, r), None);
                4
            }
            CellPattern::Triangle => {
                program.linear(xy(x + half, y + half), Some(GRID_FEED));
                program.linear(xy(x, y + half), None);
                program.linear(xy(x, y), None);
                3
            }
            CellPattern::Wave => {
                for k in 0..8 {
                    let k = k as f64;
                    let wave_x = x + k * step / 8.0;
                    let wave_y = y + step / 4.0 + (step / 4.0) * (k * f64::consts::FRAC_PI_4).sin();
                    program.linear(xy(wave_x, wave_y), Some(GRID_FEED));
                }
                8
            }
        }
    }
}

/// Tile a `size` square at `origin` into `count` x `count` cells and cut a small pattern in each.
/// Stops once `operations` is reached, finishing the pattern in progress, so the count returned
/// may overshoot by up to one pattern. Patterns cycle square, circle, triangle, wave by cell,
/// not by operation count.
pub fn grid(
    program: &mut Program,
    origin: Point2<f64>,
    size: f64,
    count: usize,
    operations: usize,
    rpm: u32,
) -> usize {
    begin_section(
        program,
        &format!("GRID PATTERN - {operations} operations"),
        rpm,
    );

    let step = size / count as f64;
    let mut ops = 0;
    let mut cell = 0;

    'cells: for i in 0..count {
        for j in 0..count {
            if ops >= operations {
                break 'cells;
            }
            let corner = origin + Vector2::new(i as f64, j as f64) * step;
            if ops == 0 {
                program.rapid(xy(corner.x, corner.y));
                program.linear(z(GRID_DEPTH), Some(PLUNGE_FEED));
            }
            ops += CellPattern::for_cell(cell).emit(program, corner, step);
            cell += 1;
        }
    }

    end_section(program);
    ops
}

/// floor(log2(remaining)), or 1 when there's one operation or less left
fn depth_cap(remaining: usize) -> u32 {
    if remaining > 1 {
        usize::BITS - 1 - remaining.leading_zeros()
    } else {
        1
    }
}

/// Cut from `start` to `end` as a Koch curve, `depth` levels deep. Returns the number of line
/// segments cut, 4^depth.
fn koch_segment(program: &mut Program, start: Point2<f64>, end: Point2<f64>, depth: u32) -> usize {
    if depth == 0 {
        program.linear(xy(end.x, end.y), Some(FRACTAL_FEED));
        return 1;
    }

    let third = (end - start) / 3.0;
    let a = start + third;
    let b = start + third * 2.0;
    // Middle third rotated 60° outward
    let peak = a + Vector2::new(
        third.x / 2.0 - third.y * SQRT_3_2,
        third.y / 2.0 + third.x * SQRT_3_2,
    );

    koch_segment(program, start, a, depth - 1)
        + koch_segment(program, a, peak, depth - 1)
        + koch_segment(program, peak, b, depth - 1)
        + koch_segment(program, b, end, depth - 1)
}

/// Six Koch curves radiating from `center`. Each arm's depth is capped by log2 of the operations
/// still wanted, and no arm is started once `operations` is reached.
pub fn fractal(
    program: &mut Program,
    center: Point2<f64>,
    size: f64,
    depth: u32,
    operations: usize,
    rpm: u32,
) -> usize {
    begin_section(
        program,
        &format!("FRACTAL PATTERN - {operations} operations"),
        rpm,
    );

    program.rapid(xy(center.x, center.y));
    program.linear(z(FRACTAL_DEPTH), Some(PLUNGE_FEED));

    let mut ops = 0;
    for arm in 0..KOCH_ARMS {
        if ops >= operations {
            break;
        }
        let angle = f64::consts::TAU * arm as f64 / KOCH_ARMS as f64;
        let end = center + Vector2::new(angle.cos(), angle.sin()) * size;
        let arm_depth = depth.min(depth_cap(operations - ops));
        ops += koch_segment(program, center, end, arm_depth);
    }

    end_section(program);
    ops
}
