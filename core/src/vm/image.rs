//! Program images: a JSON serialisation of [`Program`] for the CLI and tests.
//!
//! ```json
//! { "entry": 0, "code": [68, 42, 0, 0, 0, 20], "literals": ["nil", {"symbol": "x"}] }
//! ```

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::val::{Val, list_from_iter, list_to_vec};

use super::bytecode::Program;

/// Literal values an image can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Literal {
    Nil,
    T,
    Fixnum(i64),
    Symbol(String),
    List(Vec<Literal>),
}

impl Literal {
    pub fn to_val(&self) -> Val {
        match self {
            Literal::Nil => Val::Nil,
            Literal::T => Val::True,
            Literal::Fixnum(n) => Val::Fixnum(*n),
            Literal::Symbol(name) => Val::symbol(name),
            Literal::List(items) => list_from_iter(items.iter().map(Literal::to_val).collect::<Vec<_>>()),
        }
    }

    pub fn from_val(val: &Val) -> Result<Self> {
        Ok(match val {
            Val::Nil => Literal::Nil,
            Val::True => Literal::T,
            Val::Fixnum(n) => Literal::Fixnum(*n),
            Val::Symbol(sym) => Literal::Symbol(sym.name().to_string()),
            Val::Cons(_) => {
                let Some(items) = list_to_vec(val) else {
                    bail!("improper list literal {val} cannot be stored in an image");
                };
                Literal::List(items.iter().map(Literal::from_val).collect::<Result<_>>()?)
            }
            other => bail!("{} literal cannot be stored in an image", other.type_name()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub entry: usize,
    pub code: Vec<u8>,
    #[serde(default)]
    pub literals: Vec<Literal>,
}

impl Image {
    pub fn from_program(program: &Program) -> Result<Self> {
        Ok(Self {
            entry: program.entry,
            code: program.code.to_vec(),
            literals: program.literals.iter().map(Literal::from_val).collect::<Result<_>>()?,
        })
    }

    pub fn to_program(&self) -> Program {
        Program::new(
            self.code.clone(),
            self.entry,
            self.literals.iter().map(Literal::to_val).collect(),
        )
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let image: Image = serde_json::from_str(text).context("malformed program image")?;
        tracing::debug!(
            target: "arcvm::image",
            code_len = image.code.len(),
            literals = image.literals.len(),
            entry = image.entry,
            "image parsed"
        );
        Ok(image)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading image {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("in image {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_string()?).with_context(|| format!("writing image {}", path.display()))
    }
}
