//! Rendering of parameter trees into CP2K's `&SECTION ... &END SECTION`
//! input syntax.

use thiserror::Error;

use crate::constants::COORDS_FILE;
use crate::structure::Structure;
use crate::tree::{deep_merge, ParamTree, ParamValue, Scalar};

/// Key holding a section's own parameter, e.g. `&ENERGY OFF`.
pub const SECTION_PARAM_KEY: &str = "_";

const INDENT: &str = "  ";

/// Parameter shapes that have no CP2K spelling.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("'{key}': a keyword value list may only hold scalars")]
    NestedValue { key: String },
    #[error("'{key}': the section parameter '_' must be a scalar or a list of scalars")]
    SectionParam { key: String },
}

/// A CP2K input file in the making.
#[derive(Debug, Clone)]
pub struct Cp2kInput {
    params: ParamTree,
}

impl Cp2kInput {
    pub fn new(params: ParamTree) -> Self {
        Self { params }
    }

    /// Points the input at the coordinates file and fills in the cell from
    /// `structure`. Values already present in the parameters are kept.
    pub fn with_structure(mut self, structure: &Structure) -> Self {
        let [a, b, c] = structure.cell.map(|v| {
            v.iter()
                .map(|x| format!("{x:.8}"))
                .collect::<Vec<_>>()
                .join(" ")
        });

        let subsys = ParamTree::new()
            .with(
                "TOPOLOGY",
                ParamTree::new()
                    .with("COORD_FILE_NAME", COORDS_FILE)
                    .with("COORD_FILE_FORMAT", "XYZ"),
            )
            .with("CELL", ParamTree::new().with("A", a).with("B", b).with("C", c));

        let mut base = ParamTree::new().with("FORCE_EVAL", ParamTree::new().with("SUBSYS", subsys));
        deep_merge(&mut base, &self.params);
        self.params = base;
        self
    }

    pub fn render(&self) -> Result<String, RenderError> {
        render_input(&self.params)
    }
}

/// Renders a parameter tree as CP2K input text.
///
/// - mapping: `&KEY [param]` ... `&END KEY`, where `param` is the `_` entry
/// - scalar: `KEY value`
/// - list: the section or keyword repeated once per element
pub fn render_input(params: &ParamTree) -> Result<String, RenderError> {
    let mut out = String::new();
    render_body(&mut out, params, 0)?;
    Ok(out)
}

fn render_body(out: &mut String, tree: &ParamTree, depth: usize) -> Result<(), RenderError> {
    for (key, value) in tree.iter() {
        if key == SECTION_PARAM_KEY {
            continue;
        }
        render_entry(out, key, value, depth)?;
    }
    Ok(())
}

fn render_entry(
    out: &mut String,
    key: &str,
    value: &ParamValue,
    depth: usize,
) -> Result<(), RenderError> {
    match value {
        ParamValue::Scalar(scalar) => push_line(out, depth, &format!("{key} {scalar}")),
        ParamValue::Mapping(section) => render_section(out, key, section, depth)?,
        ParamValue::List(items) => {
            for item in items {
                match item {
                    ParamValue::List(values) => {
                        let joined = join_scalars(values)
                            .ok_or_else(|| RenderError::NestedValue { key: key.to_string() })?;
                        push_line(out, depth, &format!("{key} {joined}"))
                    }
                    other => render_entry(out, key, other, depth)?,
                }
            }
        }
    }
    Ok(())
}

fn render_section(
    out: &mut String,
    key: &str,
    section: &ParamTree,
    depth: usize,
) -> Result<(), RenderError> {
    let param = match section.get(SECTION_PARAM_KEY) {
        None => None,
        Some(ParamValue::Scalar(param)) => Some(param.to_string()),
        Some(ParamValue::List(values)) => Some(
            join_scalars(values).ok_or_else(|| RenderError::SectionParam {
                key: key.to_string(),
            })?,
        ),
        Some(ParamValue::Mapping(_)) => {
            return Err(RenderError::SectionParam {
                key: key.to_string(),
            })
        }
    };
    let header = match param {
        Some(param) => format!("&{key} {param}"),
        None => format!("&{key}"),
    };
    push_line(out, depth, &header);
    render_body(out, section, depth + 1)?;
    push_line(out, depth, &format!("&END {key}"));
    Ok(())
}

/// Space-separated scalars, or `None` if any element is not a scalar.
fn join_scalars(values: &[ParamValue]) -> Option<String> {
    let parts = values
        .iter()
        .map(|v| v.as_scalar().map(Scalar::to_string))
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join(" "))
}

fn push_line(out: &mut String, depth: usize, line: &str) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(line);
    out.push('\n');
}
