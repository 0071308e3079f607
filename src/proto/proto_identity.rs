use crate::constants::FACET_PATH_MAX_LEN;
use crate::proto::{WireError, WireReader, WireWriter};

/// Identity of a remote target object: a name qualified by an optional
/// category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Identity {
    pub name: String,
    pub category: String,
}

impl Identity {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            category: String::new(),
        }
    }

    pub fn write(&self, w: &mut WireWriter<'_>) {
        w.write_string(&self.name);
        w.write_string(&self.category);
    }

    pub fn read(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        let name = r.read_string()?;
        let category = r.read_string()?;
        Ok(Self { name, category })
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.category.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.category, self.name)
        }
    }
}

/// Writes a facet in the legacy facet-path encoding: a string sequence of
/// zero elements (no facet) or exactly one element.
pub fn write_facet_path(w: &mut WireWriter<'_>, facet: &str) {
    if facet.is_empty() {
        w.write_string_seq::<&str>(&[]);
    } else {
        w.write_string_seq(&[facet]);
    }
}

/// Reads a legacy facet path. More than one element is a marshaling error.
pub fn read_facet_path(r: &mut WireReader<'_>) -> Result<String, WireError> {
    let len = r.read_u32()? as usize;
    if len > FACET_PATH_MAX_LEN {
        return Err(WireError::OversizedSequence {
            len,
            max: FACET_PATH_MAX_LEN,
        });
    }
    if len == 0 {
        return Ok(String::new());
    }
    r.read_string()
}
