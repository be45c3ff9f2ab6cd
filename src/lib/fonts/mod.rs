use crate::error::FontError;
use crate::patterns::{begin_section, end_section};
use crate::{xy, z, Program};
use nalgebra::{Point2, Vector2};
use roxmltree::{Document, Node};
use std::collections::HashMap;

/// Depth the engraving bit is plunged to
const ENGRAVE_Z: f64 = -0.3;
/// Height to lift to between letters
const LIFT_Z: f64 = 2.0;
const PLUNGE_FEED: f64 = 200.0;
const ENGRAVE_FEED: f64 = 400.0;

/// Single-stroke lowercase letters in SVG font form, 10 units to the em.
/// Y points up; descenders go below zero.
const BUILTIN_FONT: &str = r#"<svg xmlns="http://www.w3.org/2000/svg">
<defs>
<font id="stroke" horiz-adv-x="12">
<font-face units-per-em="10" />
<glyph unicode="g" d="M 4 6 L 4 8 L 2 8 L 0 6 L 0 4 L 0 2 L 2 0 L 4 0 L 4 2 L 4 -2 L 2 -2 L 0 -2" />
<glyph unicode="h" d="M 0 0 L 0 10 L 0 5 L 2 5 L 4 5 L 4 0" />
<glyph unicode="s" d="M 4 8 L 2 8 L 0 6 L 0 5 L 2 4 L 4 4 L 4 2 L 2 0 L 0 0" />
<glyph unicode="e" d="M 0 4 L 4 4 L 4 6 L 2 8 L 0 6 L 0 2 L 2 0 L 4 0" />
<glyph unicode="n" d="M 0 0 L 0 8 L 0 5 L 2 8 L 4 8 L 4 0" />
<glyph unicode="d" d="M 4 0 L 4 10 L 4 8 L 2 8 L 0 6 L 0 2 L 2 0 L 4 0" />
<glyph unicode="r" d="M 0 0 L 0 8 L 0 5 L 2 8 L 4 6" />
</font>
</defs>
</svg>"#;

pub struct Font {
    glyphs: HashMap<char, Glyph>,
    /// Advance for characters with no glyph, in ems
    advance: f64,
}

pub struct Glyph {
    moves: Vec<Move>,
    /// Advance, in ems
    width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MoveType {
    Move,
    Line,
}

#[derive(Debug, Clone, Copy)]
pub struct Move {
    move_type: MoveType,
    point: Point2<f64>,
}

impl Font {
    /// The stroke font compiled into the binary.
    pub fn builtin() -> Result<Self, FontError> {
        Font::from_svg_str(BUILTIN_FONT)
    }

    pub fn from_svg_str(data: &str) -> Result<Self, FontError> {
        parse_svg_xml_font(data)
    }

    pub fn has_glyph(&self, c: char) -> bool {
        self.glyphs.contains_key(&c)
    }

    /// How far the cursor moves after `c`, in ems. Characters we can't draw still take up space.
    pub fn advance(&self, c: char) -> f64 {
        self.glyphs.get(&c).map_or(self.advance, |g| g.width)
    }

    /// Engrave `s` with its baseline starting at `origin`, one em being `char_size` mm.
    /// Each stroke point counts as one operation; engraving stops once `operations` are used,
    /// even part way through a letter. Returns the operations used.
    pub fn engrave_text(
        &self,
        program: &mut Program,
        s: &str,
        origin: Point2<f64>,
        char_size: f64,
        operations: usize,
        rpm: u32,
    ) -> usize {
        begin_section(
            program,
            &format!("TEXT ENGRAVING '{s}' - {operations} operations"),
            rpm,
        );

        let mut ops = 0;
        let mut cursor = origin;
        for c in s.chars() {
            if ops < operations {
                if let Some(glyph) = self.glyphs.get(&c) {
                    ops += glyph.engrave(program, cursor, char_size, operations - ops);
                    program.rapid(z(LIFT_Z));
                }
            }
            cursor.x += self.advance(c) * char_size;
        }

        end_section(program);
        ops
    }
}

impl Glyph {
    fn engrave(&self, program: &mut Program, origin: Point2<f64>, scale: f64, budget: usize) -> usize {
        let mut ops = 0;
        let mut cutting = false;
        for m in &self.moves {
            if ops >= budget {
                break;
            }
            let p = origin + m.point.coords * scale;
            match m.move_type {
                MoveType::Move => {
                    // Lift, travel, plunge
                    if cutting {
                        program.rapid(z(LIFT_Z));
                    }
                    program.rapid(xy(p.x, p.y));
                    program.linear(z(ENGRAVE_Z), Some(PLUNGE_FEED));
                    cutting = true;
                }
                MoveType::Line => {
                    program.linear(xy(p.x, p.y), Some(ENGRAVE_FEED));
                }
            }
            ops += 1;
        }
        ops
    }
}

fn number_attribute(
    node: Node,
    element: &'static str,
    attribute: &'static str,
) -> Result<f64, FontError> {
    node.attribute(attribute)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .ok_or(FontError::BadAttribute { element, attribute })
}

/// Parse an SVG path made only of `M` and `L` commands, normalizing by `units_per_em`.
fn parse_path(glyph: char, d: &str, units_per_em: f64) -> Result<Vec<Move>, FontError> {
    let mut moves = Vec::new();
    // A path always opens with a move
    let mut move_type = MoveType::Move;
    let mut x: Option<f64> = None;

    for token in d.split_whitespace() {
        match token {
            "M" | "L" if x.is_none() => {
                move_type = if token == "M" {
                    MoveType::Move
                } else {
                    MoveType::Line
                };
            }
            _ => {
                let v = token.parse::<f64>().map_err(|_| FontError::BadPath {
                    glyph,
                    token: token.to_string(),
                })?;
                match x.take() {
                    None => x = Some(v),
                    Some(px) => {
                        moves.push(Move {
                            move_type,
                            point: Point2::from(Vector2::new(px, v) / units_per_em),
                        });
                        // Implicit repeats after a move are lines, as in SVG
                        move_type = MoveType::Line;
                    }
                }
            }
        }
    }
    if x.is_some() {
        return Err(FontError::BadPath {
            glyph,
            token: d.to_string(),
        });
    }
    Ok(moves)
}

fn parse_svg_xml_font(data: &str) -> Result<Font, FontError> {
    let doc = Document::parse(data)?;

    let font = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "font")
        .ok_or(FontError::MissingElement("font"))?;
    let font_face = font
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "font-face")
        .ok_or(FontError::MissingElement("font-face"))?;

    let units_per_em = number_attribute(font_face, "font-face", "units-per-em")?;
    let advance = number_attribute(font, "font", "horiz-adv-x")? / units_per_em;

    let mut glyphs = HashMap::new();
    for n in font
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "glyph")
    {
        // The unicode value is the key for the glyph
        let name = n
            .attribute("unicode")
            .and_then(|s| s.chars().next())
            .ok_or(FontError::BadAttribute {
                element: "glyph",
                attribute: "unicode",
            })?;
        let moves = match n.attribute("d") {
            Some(d) => parse_path(name, d, units_per_em)?,
            None => Vec::new(),
        };
        let width = match n.attribute("horiz-adv-x") {
            Some(_) => number_attribute(n, "glyph", "horiz-adv-x")? / units_per_em,
            None => advance,
        };
        glyphs.insert(name, Glyph { moves, width });
    }

    Ok(Font { glyphs, advance })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Command;

    const EPSILON: f64 = 1e-9;

    fn first_rapid_xy(program: &Program) -> Option<(f64, f64)> {
        program.commands().iter().find_map(|c| match c {
            Command::Rapid(p) if p.x.is_some() => Some((p.x.unwrap(), p.y.unwrap())),
            _ => None,
        })
    }

    #[test]
    fn test_builtin_font() {
        let font = Font::builtin().unwrap();
        for c in "ghsender".chars() {
            assert!(font.has_glyph(c), "missing glyph {c}");
        }
        assert!(!font.has_glyph('x'));
        assert!((font.advance('g') - 1.2).abs() < EPSILON);
        assert!((font.advance('?') - 1.2).abs() < EPSILON);

        let g = &font.glyphs[&'g'];
        assert_eq!(g.moves.len(), 12);
        assert_eq!(g.moves[0].move_type, MoveType::Move);
        assert!(g.moves[1..].iter().all(|m| m.move_type == MoveType::Line));
        assert!((g.moves[9].point.y + 0.2).abs() < EPSILON);
    }

    #[test]
    fn test_engrave_letter() {
        let font = Font::builtin().unwrap();
        let mut program = Program::new();
        let ops = font.engrave_text(&mut program, "r", Point2::new(20.0, 120.0), 10.0, 100, 15000);
        assert_eq!(ops, 5);
        assert_eq!(
            program.to_gcode(),
            "; ===== TEXT ENGRAVING 'r' - 100 operations =====\n\
             M3 S15000\n\
             G4 P2.0\n\
             G0 X20.000 Y120.000\n\
             G1 Z-0.300 F200\n\
             G1 X20.000 Y128.000 F400\n\
             G1 X20.000 Y125.000\n\
             G1 X22.000 Y128.000\n\
             G1 X24.000 Y126.000\n\
             G0 Z2.000\n\
             G0 Z25.000\n\
             M5\n\
             \n"
        );
    }

    #[test]
    fn test_unsupported_characters_skip_but_advance() {
        let font = Font::builtin().unwrap();

        let mut skipped = Program::new();
        let ops = font.engrave_text(&mut skipped, "xyz", Point2::new(0.0, 0.0), 10.0, 100, 15000);
        assert_eq!(ops, 0);
        assert_eq!(skipped.stats().motion, 1); // only the final retract

        let mut shifted = Program::new();
        font.engrave_text(&mut shifted, "?h", Point2::new(0.0, 0.0), 10.0, 100, 15000);
        let (x, y) = first_rapid_xy(&shifted).unwrap();
        assert!((x - 12.0).abs() < EPSILON);
        assert!(y.abs() < EPSILON);
    }

    #[test]
    fn test_engraving_stops_at_budget() {
        let font = Font::builtin().unwrap();
        let mut program = Program::new();
        let ops = font.engrave_text(&mut program, "ghsender", Point2::new(0.0, 0.0), 10.0, 15, 15000);
        // 12 points of 'g', then 3 of 'h'
        assert_eq!(ops, 15);
        let lifts = program
            .commands()
            .iter()
            .filter(|c| **c == Command::Rapid(z(LIFT_Z)))
            .count();
        assert_eq!(lifts, 2);
    }

    #[test]
    fn test_multi_stroke_glyph() {
        let font = Font::from_svg_str(
            r#"<svg><font horiz-adv-x="10"><font-face units-per-em="10"/>
            <glyph unicode="=" horiz-adv-x="5" d="M 0 3 L 10 3 M 0 7 10 7"/></font></svg>"#,
        )
        .unwrap();
        assert!((font.advance('=') - 0.5).abs() < EPSILON);
        let mut program = Program::new();
        assert_eq!(
            font.engrave_text(&mut program, "=", Point2::new(0.0, 0.0), 1.0, 10, 15000),
            4
        );
        let plunges = program
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::Linear { feed: Some(f), .. } if *f == PLUNGE_FEED))
            .count();
        assert_eq!(plunges, 2);
    }

    #[test]
    fn test_bad_fonts() {
        assert!(matches!(Font::from_svg_str("<svg"), Err(FontError::Xml(_))));
        assert!(matches!(
            Font::from_svg_str("<svg/>"),
            Err(FontError::MissingElement("font"))
        ));
        assert!(matches!(
            Font::from_svg_str(r#"<font horiz-adv-x="12"><font-face/></font>"#),
            Err(FontError::BadAttribute {
                attribute: "units-per-em",
                ..
            })
        ));
        assert!(matches!(
            Font::from_svg_str(
                r#"<font horiz-adv-x="12"><font-face units-per-em="10"/><glyph unicode="a" d="M 1 2 L 3"/></font>"#
            ),
            Err(FontError::BadPath { glyph: 'a', .. })
        ));
        assert!(matches!(
            Font::from_svg_str(
                r#"<font horiz-adv-x="12"><font-face units-per-em="10"/><glyph unicode="a" d="M 1 2 C 3 4"/></font>"#
            ),
            Err(FontError::BadPath { glyph: 'a', .. })
        ));
    }
}
