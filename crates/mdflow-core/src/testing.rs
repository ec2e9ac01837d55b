//! Shared fixtures for unit tests.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::calc::{CalcOptions, CalculationInputs};
use crate::code::Code;
use crate::protocol::build_parameters;
use crate::store::{digest_tree, StoredParameters};
use crate::structure::{Site, Structure};
use crate::tree::ParamTree;

pub const WATER_XYZ: &str = r#"3
Lattice="10.0 0.0 0.0 0.0 10.0 0.0 0.0 0.0 10.0"
O   0.000  0.000  0.119
H   0.000  0.763 -0.477
H   0.000 -0.763 -0.477
"#;

pub fn water() -> Structure {
    let site = |symbol: &str, position: [f64; 3]| Site {
        symbol: symbol.to_string(),
        position,
    };
    Structure {
        cell: [[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]],
        sites: vec![
            site("O", [0.0, 0.0, 0.119]),
            site("H", [0.0, 0.763, -0.477]),
            site("H", [0.0, -0.763, -0.477]),
        ],
    }
}

pub fn calculation_inputs(executable: &str) -> CalculationInputs {
    let tree = build_parameters(&ParamTree::new());
    CalculationInputs {
        code: Code::new("cp2k", "localhost", executable),
        structure: water(),
        parameters: StoredParameters {
            digest: digest_tree(&tree).unwrap(),
            tree,
        },
        options: CalcOptions::default(),
        parent_folder: None,
    }
}

/// Writes an executable shell script and returns its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path.to_string_lossy().to_string()
}
