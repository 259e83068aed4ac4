//! Source rewriting for GLSL older than 4.40.
//!
//! Older GLSL lets vertex attributes, varyings and fragment outputs go
//! without `layout(location = N)` and matches varyings across stages by
//! name. The naga front end wants explicit locations, so a legacy source has
//! its `#version` raised and every unlocated top-level `in`/`out`
//! declaration given a location. Rewrites stay on the line they came from,
//! so diagnostics keep pointing at the user's line numbers.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;

/// Oldest GLSL version the naga front end accepts.
const MIN_FRONTEND_VERSION: u32 = 440;
pub(crate) const NORMALIZED_VERSION_LINE: &str = "#version 450 core";

const AUXILIARY_QUALIFIERS: &[&str] = &[
    "smooth",
    "flat",
    "noperspective",
    "centroid",
    "sample",
    "invariant",
    "precise",
    "highp",
    "mediump",
    "lowp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Direction {
    In,
    Out,
}

impl Direction {
    fn keyword(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// One name declared by a top-level `in` or `out` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Declaration {
    pub direction: Direction,
    pub name: String,
    /// `None` when the source left it to the front end.
    pub location: Option<u32>,
    /// The location was picked here rather than written in the source.
    pub assigned: bool,
}

#[derive(Debug)]
pub(crate) struct Normalized<'a> {
    pub text: Cow<'a, str>,
    pub legacy: bool,
    pub declarations: Vec<Declaration>,
}

impl Normalized<'_> {
    pub fn assigned(&self, direction: Direction) -> usize {
        self.declarations
            .iter()
            .filter(|decl| decl.assigned && decl.direction == direction)
            .count()
    }
}

#[derive(Debug)]
struct Statement<'a> {
    line: usize,
    indent: &'a str,
    layout: Option<Option<u32>>,
    qualifiers: Vec<&'a str>,
    direction: Direction,
    ty: &'a str,
    declarators: Vec<String>,
    comment: &'a str,
}

impl Statement<'_> {
    fn unlocated(&self) -> bool {
        self.layout.is_none()
    }

    fn rewrite(&self, locations: &[Option<u32>]) -> String {
        let mut out = String::from(self.indent);
        for (index, (declarator, location)) in self.declarators.iter().zip(locations).enumerate() {
            if index > 0 {
                out.push(' ');
            }
            if let Some(location) = location {
                let _ = write!(out, "layout(location = {location}) ");
            }
            for qualifier in &self.qualifiers {
                out.push_str(qualifier);
                out.push(' ');
            }
            let _ = write!(out, "{} {} {declarator};", self.direction.keyword(), self.ty);
        }
        if !self.comment.is_empty() {
            out.push(' ');
            out.push_str(self.comment);
        }
        out
    }
}

#[derive(Debug, Default)]
struct Locations {
    used: HashMap<Direction, BTreeSet<u32>>,
}

impl Locations {
    fn reserve(&mut self, direction: Direction, start: u32, slots: u32) {
        self.used
            .entry(direction)
            .or_default()
            .extend(start..start.saturating_add(slots));
    }

    fn next_free(&mut self, direction: Direction, slots: u32) -> u32 {
        let used = self.used.entry(direction).or_default();
        let mut start = 0;
        while (start..start + slots).any(|location| used.contains(&location)) {
            start += 1;
        }
        used.extend(start..start + slots);
        start
    }
}

/// Prepares `text` for the front end.
///
/// `preferred` maps names of unlocated `in` declarations to the location
/// they must take, which is how a fragment stage picks up the locations of
/// the vertex outputs it reads. Other unlocated names take the lowest free
/// location in declaration order.
pub(crate) fn normalize<'a>(text: &'a str, preferred: &HashMap<String, u32>) -> Normalized<'a> {
    let lines: Vec<&str> = text.split('\n').collect();
    let version_line = legacy_version_line(&lines);
    let legacy = version_line.is_some();
    let statements = top_level_statements(&lines);

    let mut locations = Locations::default();
    let mut resolved: Vec<Vec<Option<u32>>> = Vec::with_capacity(statements.len());
    for statement in &statements {
        let mut slots_for_statement = Vec::with_capacity(statement.declarators.len());
        let mut next = statement.layout.flatten();
        for declarator in &statement.declarators {
            match next {
                Some(location) => {
                    let span = slots(statement.ty, declarator);
                    locations.reserve(statement.direction, location, span);
                    slots_for_statement.push(Some(location));
                    next = Some(location + span);
                }
                None => slots_for_statement.push(None),
            }
        }
        resolved.push(slots_for_statement);
    }

    if legacy {
        for (statement, resolved) in statements.iter().zip(resolved.iter_mut()) {
            if !statement.unlocated() || statement.direction != Direction::In {
                continue;
            }
            for (declarator, location) in statement.declarators.iter().zip(resolved.iter_mut()) {
                if let Some(&wanted) = preferred.get(declarator_name(declarator)) {
                    locations.reserve(statement.direction, wanted, slots(statement.ty, declarator));
                    *location = Some(wanted);
                }
            }
        }
        for (statement, resolved) in statements.iter().zip(resolved.iter_mut()) {
            if !statement.unlocated() {
                continue;
            }
            for (declarator, location) in statement.declarators.iter().zip(resolved.iter_mut()) {
                if location.is_none() {
                    *location = Some(
                        locations.next_free(statement.direction, slots(statement.ty, declarator)),
                    );
                }
            }
        }
    }

    let declarations = statements
        .iter()
        .zip(&resolved)
        .flat_map(|(statement, resolved)| {
            statement
                .declarators
                .iter()
                .zip(resolved)
                .map(move |(declarator, location)| Declaration {
                    direction: statement.direction,
                    name: declarator_name(declarator).to_string(),
                    location: *location,
                    assigned: legacy && statement.unlocated(),
                })
        })
        .collect();

    let Some(version_line) = version_line else {
        return Normalized {
            text: Cow::Borrowed(text),
            legacy,
            declarations,
        };
    };

    let mut rewritten: Vec<Cow<'_, str>> = lines.iter().map(|line| Cow::Borrowed(*line)).collect();
    rewritten[version_line] = Cow::Borrowed(NORMALIZED_VERSION_LINE);
    for (statement, resolved) in statements.iter().zip(&resolved) {
        if statement.unlocated() {
            rewritten[statement.line] = Cow::Owned(statement.rewrite(resolved));
        }
    }

    Normalized {
        text: Cow::Owned(rewritten.join("\n")),
        legacy,
        declarations,
    }
}

fn legacy_version_line(lines: &[&str]) -> Option<usize> {
    let (index, line) = lines
        .iter()
        .enumerate()
        .find(|(_, line)| !line.trim().is_empty())?;
    let version = line
        .trim()
        .strip_prefix("#version")?
        .split_whitespace()
        .next()?
        .parse::<u32>()
        .ok()?;
    (version < MIN_FRONTEND_VERSION).then_some(index)
}

fn top_level_statements<'a>(lines: &[&'a str]) -> Vec<Statement<'a>> {
    let mut statements = Vec::new();
    let mut depth = 0usize;
    let mut in_block_comment = false;

    for (index, &line) in lines.iter().enumerate() {
        let at_top_level = depth == 0 && !in_block_comment;
        if at_top_level && !line.trim_start().starts_with('#') {
            if let Some(statement) = parse_statement(index, line) {
                statements.push(statement);
            }
        }

        for ch in strip_comments(line, &mut in_block_comment).chars() {
            match ch {
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
    }
    statements
}

fn strip_comments(line: &str, in_block_comment: &mut bool) -> String {
    let mut code = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if *in_block_comment {
            if ch == '*' && chars.peek() == Some(&'/') {
                chars.next();
                *in_block_comment = false;
            }
            continue;
        }
        match (ch, chars.peek()) {
            ('/', Some('/')) => break,
            ('/', Some('*')) => {
                chars.next();
                *in_block_comment = true;
            }
            _ => code.push(ch),
        }
    }
    code
}

fn parse_statement(line_index: usize, line: &str) -> Option<Statement<'_>> {
    let rest = line.trim_start();
    let indent = &line[..line.len() - rest.len()];
    let (code, comment) = match rest.find("//") {
        Some(position) => rest.split_at(position),
        None => (rest, ""),
    };
    let body = code.trim_end().strip_suffix(';')?;
    if body.contains([';', '{', '}', '/']) {
        return None;
    }

    let (layout, body) = split_layout(body)?;
    let mut tokens = body.split_whitespace();
    let mut qualifiers = Vec::new();
    let direction = loop {
        match tokens.next()? {
            "in" => break Direction::In,
            "out" => break Direction::Out,
            token if AUXILIARY_QUALIFIERS.contains(&token) => qualifiers.push(token),
            _ => return None,
        }
    };
    let ty = tokens.next()?;
    let declarators: Vec<String> = tokens
        .collect::<String>()
        .split(',')
        .map(str::to_string)
        .filter(|declarator| !declarator_name(declarator).is_empty())
        .collect();
    if declarators.is_empty() {
        return None;
    }

    Some(Statement {
        line: line_index,
        indent,
        layout,
        qualifiers,
        direction,
        ty,
        declarators,
        comment: comment.trim_end(),
    })
}

/// Splits a leading `layout(...)` off `body`. The outer option is `Some`
/// when a layout is present, the inner one carries its location.
fn split_layout(body: &str) -> Option<(Option<Option<u32>>, &str)> {
    let trimmed = body.trim_start();
    let Some(rest) = trimmed.strip_prefix("layout") else {
        return Some((None, trimmed));
    };
    let rest = rest.trim_start().strip_prefix('(')?;
    let (arguments, remainder) = rest.split_once(')')?;
    let location = arguments.split(',').find_map(|argument| {
        let (key, value) = argument.split_once('=')?;
        (key.trim() == "location")
            .then(|| value.trim().parse::<u32>().ok())
            .flatten()
    });
    Some((Some(location), remainder))
}

fn declarator_name(declarator: &str) -> &str {
    declarator.split('[').next().unwrap_or_default().trim()
}

/// Locations taken by one declarator: matrices use one per column, arrays
/// one per element.
fn slots(ty: &str, declarator: &str) -> u32 {
    let per_element = ty
        .strip_prefix("dmat")
        .or_else(|| ty.strip_prefix("mat"))
        .and_then(|dims| dims.chars().next())
        .and_then(|columns| columns.to_digit(10))
        .unwrap_or(1);
    let elements = declarator
        .split_once('[')
        .and_then(|(_, rest)| rest.split(']').next())
        .and_then(|count| count.trim().parse::<u32>().ok())
        .unwrap_or(1)
        .max(1);
    per_element * elements
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locations_of(normalized: &Normalized<'_>, direction: Direction) -> Vec<(String, Option<u32>)> {
        normalized
            .declarations
            .iter()
            .filter(|decl| decl.direction == direction)
            .map(|decl| (decl.name.clone(), decl.location))
            .collect()
    }

    #[test]
    fn raises_legacy_version_directive() {
        let legacy = normalize("\n#version 330 core\nvoid main() {}\n", &HashMap::new());
        assert!(legacy.legacy);
        assert_eq!(legacy.text, "\n#version 450 core\nvoid main() {}\n");

        let modern = normalize("#version 460\nvoid main() {}\n", &HashMap::new());
        assert!(!modern.legacy);
        assert!(matches!(modern.text, Cow::Borrowed(_)));

        let unversioned = normalize("void main() {}\n", &HashMap::new());
        assert!(matches!(unversioned.text, Cow::Borrowed(_)));
    }

    #[test]
    fn assigns_unlocated_declarations_in_order() {
        let source = "#version 330 core\n\
                      layout (location = 0) in vec2 aPos;\n\
                      out vec2 uv;\n\
                      flat out int id; // per triangle\n\
                      void main() {}\n";
        let normalized = normalize(source, &HashMap::new());

        assert_eq!(
            locations_of(&normalized, Direction::Out),
            vec![("uv".to_string(), Some(0)), ("id".to_string(), Some(1))]
        );
        assert_eq!(normalized.assigned(Direction::Out), 2);
        assert_eq!(normalized.assigned(Direction::In), 0);

        let lines: Vec<&str> = normalized.text.split('\n').collect();
        assert_eq!(lines.len(), source.split('\n').count());
        assert_eq!(lines[2], "layout(location = 0) out vec2 uv;");
        assert_eq!(lines[3], "layout(location = 1) flat out int id; // per triangle");
    }

    #[test]
    fn preferred_names_take_their_locations() {
        let source = "#version 330 core\nin float shade;\nin vec2 uv;\nin vec3 extra;\nout vec4 color;\n";
        let preferred = HashMap::from([("uv".to_string(), 0), ("shade".to_string(), 1)]);
        let normalized = normalize(source, &preferred);

        assert_eq!(
            locations_of(&normalized, Direction::In),
            vec![
                ("shade".to_string(), Some(1)),
                ("uv".to_string(), Some(0)),
                ("extra".to_string(), Some(2)),
            ]
        );
        assert_eq!(
            locations_of(&normalized, Direction::Out),
            vec![("color".to_string(), Some(0))]
        );
    }

    #[test]
    fn skips_explicit_locations_and_multi_slot_types() {
        let source = "#version 410\n\
                      layout(location = 0) out vec2 fixed;\n\
                      out mat3 basis;\n\
                      out vec4 weights[2], tint;\n";
        let normalized = normalize(source, &HashMap::new());

        assert_eq!(
            locations_of(&normalized, Direction::Out),
            vec![
                ("fixed".to_string(), Some(0)),
                ("basis".to_string(), Some(1)),
                ("weights".to_string(), Some(4)),
                ("tint".to_string(), Some(6)),
            ]
        );
        let lines: Vec<&str> = normalized.text.split('\n').collect();
        assert_eq!(
            lines[3],
            "layout(location = 4) out vec4 weights[2]; layout(location = 6) out vec4 tint;"
        );
    }

    #[test]
    fn leaves_function_bodies_and_comments_alone() {
        let source = "#version 330 core\n\
                      /*\n\
                      out vec2 commented;\n\
                      */\n\
                      void helper(out float value);\n\
                      void main() {\n\
                      \x20   out vec2 not_global;\n\
                      }\n";
        let normalized = normalize(source, &HashMap::new());
        assert!(normalized.declarations.is_empty());
        assert!(normalized.text.contains("\n    out vec2 not_global;\n"));
    }

    #[test]
    fn modern_sources_report_declarations_without_rewriting() {
        let source = "#version 450 core\nlayout(location = 2) out vec2 uv;\nout float unlocated;\n";
        let normalized = normalize(source, &HashMap::new());
        assert!(matches!(normalized.text, Cow::Borrowed(_)));
        assert_eq!(
            locations_of(&normalized, Direction::Out),
            vec![("uv".to_string(), Some(2)), ("unlocated".to_string(), None)]
        );
        assert_eq!(normalized.assigned(Direction::Out), 0);
    }
}
