use nalgebra::{Point3, Vector3};
use tracing::{debug, info};

use crate::{ArcEnd, Command, EnvelopeError, Position, Program};

/// Extents smaller than this don't constrain the scale
const MIN_EXTENT: f64 = 1e-6;

/// The physical volume, in mm, that the generated toolpath must fit inside.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorkEnvelope {
    size: Vector3<f64>,
}

impl WorkEnvelope {
    pub fn new(width: f64, depth: f64, height: f64) -> Result<Self, EnvelopeError> {
        for &(axis, value) in [("width", width), ("depth", depth), ("height", height)].iter() {
            if !(value.is_finite() && value > 0.0) {
                return Err(EnvelopeError::NonPositive { axis, value });
            }
        }
        Ok(WorkEnvelope {
            size: Vector3::new(width, depth, height),
        })
    }

    pub fn width(&self) -> f64 {
        self.size.x
    }

    pub fn depth(&self) -> f64 {
        self.size.y
    }

    pub fn height(&self) -> f64 {
        self.size.z
    }
}

/// Axis-aligned bounds of every absolute coordinate in a program.
/// An axis that never appears has bounds 0..0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl BoundingBox {
    /// Returns `None` if no command carries an X, Y or Z word.
    pub fn of(commands: &[Command]) -> Option<Self> {
        let mut min: [Option<f64>; 3] = [None; 3];
        let mut max: [Option<f64>; 3] = [None; 3];
        for p in commands.iter().filter_map(Command::position) {
            for (axis, v) in [p.x, p.y, p.z].iter().enumerate() {
                if let Some(v) = *v {
                    min[axis] = Some(min[axis].map_or(v, |m| m.min(v)));
                    max[axis] = Some(max[axis].map_or(v, |m| m.max(v)));
                }
            }
        }
        if min.iter().all(Option::is_none) {
            return None;
        }
        Some(BoundingBox {
            min: Point3::new(
                min[0].unwrap_or(0.0),
                min[1].unwrap_or(0.0),
                min[2].unwrap_or(0.0),
            ),
            max: Point3::new(
                max[0].unwrap_or(0.0),
                max[1].unwrap_or(0.0),
                max[2].unwrap_or(0.0),
            ),
        })
    }

    pub fn extent(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// The largest uniform scale that keeps every axis inside `envelope`.
    /// Flat axes give an infinite candidate and are ignored; if every axis is flat the scale is 1.
    pub fn scale_factor(&self, envelope: &WorkEnvelope) -> f64 {
        envelope
            .size
            .iter()
            .zip(self.extent().iter())
            .map(|(dim, ext)| {
                if *ext > MIN_EXTENT {
                    dim / ext
                } else {
                    f64::INFINITY
                }
            })
            .filter(|s| s.is_finite() && *s > 0.0)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.min(s))))
            .unwrap_or(1.0)
    }
}

/// Translation to the origin followed by one isotropic scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fit {
    pub offset: Point3<f64>,
    pub scale: f64,
}

impl Fit {
    pub fn for_program(program: &Program, envelope: &WorkEnvelope) -> Option<Self> {
        let bounds = BoundingBox::of(program.commands())?;
        let scale = bounds.scale_factor(envelope);
        debug!(min = ?bounds.min, max = ?bounds.max, "Program bounds");
        Some(Fit {
            offset: bounds.min,
            scale,
        })
    }

    fn absolute(&self, v: Option<f64>, origin: f64) -> Option<f64> {
        v.map(|v| (v - origin) * self.scale)
    }

    fn relative(&self, v: Option<f64>) -> Option<f64> {
        v.map(|v| v * self.scale)
    }

    pub fn position(&self, p: &Position) -> Position {
        Position {
            x: self.absolute(p.x, self.offset.x),
            y: self.absolute(p.y, self.offset.y),
            z: self.absolute(p.z, self.offset.z),
        }
    }

    pub fn arc_end(&self, a: &ArcEnd) -> ArcEnd {
        ArcEnd {
            x: self.absolute(a.x, self.offset.x),
            y: self.absolute(a.y, self.offset.y),
            i: self.relative(a.i),
            j: self.relative(a.j),
        }
    }

    pub fn apply(&self, command: &Command) -> Command {
        match command {
            Command::Rapid(p) => Command::Rapid(self.position(p)),
            Command::Linear { to, feed } => Command::Linear {
                to: self.position(to),
                feed: *feed,
            },
            Command::Arc { to, feed } => Command::Arc {
                to: self.arc_end(to),
                feed: *feed,
            },
            other => other.clone(),
        }
    }
}

/// Move the program's minimum corner to the origin and scale it uniformly to fit `envelope`.
/// A program with no coordinates is returned unchanged.
pub fn scale_to_envelope(program: &Program, envelope: &WorkEnvelope) -> Program {
    match Fit::for_program(program, envelope) {
        Some(fit) => {
            info!(
                scale = fit.scale,
                "Scaling program to {}x{}x{}mm",
                envelope.width(),
                envelope.depth(),
                envelope.height()
            );
            program
                .commands()
                .iter()
                .map(|c| fit.apply(c))
                .collect::<Vec<_>>()
                .into()
        }
        None => {
            info!("No coordinates found to scale, leaving program unscaled");
            program.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{xy, xyij, xyz, z};

    const EPSILON: f64 = 1e-9;

    fn envelope(w: f64, d: f64, h: f64) -> WorkEnvelope {
        WorkEnvelope::new(w, d, h).unwrap()
    }

    fn sample() -> Program {
        let mut program = Program::new();
        program.comment("sample");
        program.rapid(z(25.0));
        program.rapid(xy(10.0, 20.0));
        program.linear(z(-1.0), Some(300.0));
        program.linear(xy(110.0, 20.0), Some(800.0));
        program.arc(xyij(110.0, 70.0, -5.0, 2.5), None);
        program
    }

    #[test]
    fn test_envelope_rejects_non_positive() {
        assert_eq!(
            WorkEnvelope::new(0.0, 1.0, 1.0),
            Err(EnvelopeError::NonPositive {
                axis: "width",
                value: 0.0
            })
        );
        assert!(WorkEnvelope::new(1.0, -3.0, 1.0).is_err());
        assert!(WorkEnvelope::new(1.0, 1.0, f64::NAN).is_err());
        assert!(WorkEnvelope::new(285.0, 172.0, 38.0).is_ok());
    }

    #[test]
    fn test_bounds() {
        let bounds = BoundingBox::of(sample().commands()).unwrap();
        assert_eq!(bounds.min, Point3::new(10.0, 20.0, -1.0));
        assert_eq!(bounds.max, Point3::new(110.0, 70.0, 25.0));
    }

    #[test]
    fn test_bounds_none_without_coordinates() {
        let mut program = Program::new();
        program.comment("nothing here");
        program.spindle_on(15000);
        program.dwell(2.0);
        assert!(BoundingBox::of(program.commands()).is_none());
        assert_eq!(scale_to_envelope(&program, &envelope(10.0, 10.0, 10.0)), program);
    }

    #[test]
    fn test_scaled_fits_envelope() {
        // Extents are 100 x 50 x 26, so X limits the scale at 2.0
        let env = envelope(200.0, 200.0, 200.0);
        let scaled = scale_to_envelope(&sample(), &env);
        let bounds = BoundingBox::of(scaled.commands()).unwrap();
        let extent = bounds.extent();
        assert!((bounds.min.coords.norm()).abs() < EPSILON);
        assert!((extent.x - 200.0).abs() < EPSILON);
        assert!((extent.y - 100.0).abs() < EPSILON);
        assert!((extent.z - 52.0).abs() < EPSILON);
    }

    #[test]
    fn test_limiting_axis_matches_envelope() {
        let env = envelope(285.0, 172.0, 38.0);
        let scaled = scale_to_envelope(&sample(), &env);
        let extent = BoundingBox::of(scaled.commands()).unwrap().extent();
        let dims = [env.width(), env.depth(), env.height()];
        let mut touching = 0;
        for (e, d) in extent.iter().zip(dims.iter()) {
            assert!(*e <= d + EPSILON);
            if (e - d).abs() < EPSILON {
                touching += 1;
            }
        }
        assert!(touching >= 1);
    }

    #[test]
    fn test_arc_offsets_scale_without_translation() {
        let scaled = scale_to_envelope(&sample(), &envelope(200.0, 200.0, 200.0));
        match scaled.commands().last().unwrap() {
            Command::Arc { to, feed } => {
                assert_eq!(*feed, None);
                assert!((to.x.unwrap() - 200.0).abs() < EPSILON);
                assert!((to.y.unwrap() - 100.0).abs() < EPSILON);
                assert!((to.i.unwrap() + 10.0).abs() < EPSILON);
                assert!((to.j.unwrap() - 5.0).abs() < EPSILON);
            }
            other => panic!("Expected an arc, got {:?}", other),
        }
    }

    #[test]
    fn test_absent_fields_stay_absent() {
        let scaled = scale_to_envelope(&sample(), &envelope(200.0, 200.0, 200.0));
        assert_eq!(scaled.commands()[0], Command::Comment("sample".to_string()));
        match &scaled.commands()[1] {
            Command::Rapid(p) => {
                assert!(p.x.is_none() && p.y.is_none());
                assert!((p.z.unwrap() - 52.0).abs() < EPSILON);
            }
            other => panic!("Expected a rapid, got {:?}", other),
        }
    }

    #[test]
    fn test_flat_axis_does_not_limit_scale() {
        let mut program = Program::new();
        program.rapid(xyz(0.0, 0.0, 5.0));
        program.linear(xyz(10.0, 5.0, 5.0), Some(100.0));
        let bounds = BoundingBox::of(program.commands()).unwrap();
        assert!((bounds.scale_factor(&envelope(50.0, 100.0, 1.0)) - 5.0).abs() < EPSILON);
    }

    #[test]
    fn test_single_point_only_translates() {
        let mut program = Program::new();
        program.rapid(xyz(3.0, 4.0, 5.0));
        let scaled = scale_to_envelope(&program, &envelope(10.0, 10.0, 10.0));
        assert_eq!(scaled.commands()[0], Command::Rapid(xyz(0.0, 0.0, 0.0)));
    }
}
