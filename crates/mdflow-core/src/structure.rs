//! Periodic structures handed to the calculation.
//!
//! Structures are read from extended XYZ files; the cell comes from the
//! `Lattice="..."` entry of the comment line or is supplied by the caller.

use std::path::Path;

use bio_files::{AtomGeneric, Xyz};
use lin_alg::f64::Vec3;
use na_seq::Element;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Three lattice vectors in Angstrom, one per row.
pub type Cell = [[f64; 3]; 3];

const LATTICE_KEY: &str = "Lattice=\"";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub symbol: String,
    /// Cartesian position in Angstrom.
    pub position: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub cell: Cell,
    pub sites: Vec<Site>,
}

#[derive(Debug, Error)]
pub enum StructureError {
    #[error("structure has no atoms")]
    Empty,
    #[error("no Lattice=\"...\" in the comment line and no cell was supplied")]
    MissingLattice,
    #[error("malformed Lattice entry: {0}")]
    BadLattice(String),
    #[error("site {index}: '{symbol}' is not an element symbol")]
    BadSymbol { index: usize, symbol: String },
    #[error("failed to access structure file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Structure {
    /// Reads an XYZ file. `cell` takes precedence over a `Lattice` entry in
    /// the file.
    pub fn load_xyz(path: &Path, cell: Option<Cell>) -> Result<Self, StructureError> {
        let xyz = Xyz::load(path).map_err(|source| StructureError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_xyz(&xyz, cell)
    }

    pub fn from_xyz(xyz: &Xyz, cell: Option<Cell>) -> Result<Self, StructureError> {
        if xyz.atoms.is_empty() {
            return Err(StructureError::Empty);
        }

        let cell = match cell {
            Some(cell) => cell,
            None => parse_lattice(&xyz.comment)?.ok_or(StructureError::MissingLattice)?,
        };

        let sites = xyz
            .atoms
            .iter()
            .map(|atom| Site {
                symbol: atom.element.to_letter().to_string(),
                position: [atom.posit.x, atom.posit.y, atom.posit.z],
            })
            .collect();

        Ok(Self { cell, sites })
    }

    /// The structure as XYZ, with the cell kept in the comment line.
    pub fn to_xyz(&self) -> Result<Xyz, StructureError> {
        let atoms = self
            .sites
            .iter()
            .enumerate()
            .map(|(i, site)| {
                let element =
                    Element::from_letter(&site.symbol).map_err(|_| StructureError::BadSymbol {
                        index: i,
                        symbol: site.symbol.clone(),
                    })?;
                let [x, y, z] = site.position;
                Ok(AtomGeneric {
                    serial_number: i as u32 + 1,
                    posit: Vec3 { x, y, z },
                    element,
                    ..Default::default()
                })
            })
            .collect::<Result<Vec<_>, StructureError>>()?;

        Ok(Xyz {
            atoms,
            comment: lattice_comment(&self.cell),
        })
    }

    pub fn save_xyz(&self, path: &Path) -> Result<(), StructureError> {
        self.to_xyz()?
            .save(path)
            .map_err(|source| StructureError::Io {
                path: path.display().to_string(),
                source,
            })
    }
}

fn lattice_comment(cell: &Cell) -> String {
    let lattice = cell
        .iter()
        .flatten()
        .map(|v| format!("{v:.8}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{LATTICE_KEY}{lattice}\"")
}

fn parse_lattice(comment: &str) -> Result<Option<Cell>, StructureError> {
    let Some(start) = comment.find(LATTICE_KEY) else {
        return Ok(None);
    };
    let rest = &comment[start + LATTICE_KEY.len()..];
    let end = rest
        .find('"')
        .ok_or_else(|| StructureError::BadLattice("unterminated quote".to_string()))?;

    let values = rest[..end]
        .split_whitespace()
        .map(|v| v.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StructureError::BadLattice(e.to_string()))?;

    if values.len() != 9 {
        return Err(StructureError::BadLattice(format!(
            "expected 9 components, found {}",
            values.len()
        )));
    }

    let mut cell = [[0.0; 3]; 3];
    for (i, value) in values.into_iter().enumerate() {
        cell[i / 3][i % 3] = value;
    }
    Ok(Some(cell))
}
