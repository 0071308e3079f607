use crate::invocation::CallMode;
use crate::proto::{Identity, WireWriter, write_facet_path};
use std::collections::HashMap;

/// Per-call context entries carried with a request.
pub type Context = HashMap<String, String>;

/// The request envelope written ahead of the parameter payload: target
/// identity, legacy facet path, operation name, mode byte, context map.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    pub identity: Identity,
    pub facet: String,
    pub operation: String,
    pub mode: CallMode,
    pub context: Context,
}

impl RequestEnvelope {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let mut w = WireWriter::new(buf);
        self.identity.write(&mut w);
        write_facet_path(&mut w, &self.facet);
        w.write_string(&self.operation);
        w.write_u8(self.mode.value());

        // Context entries are written sorted so the encoding is stable.
        let mut entries: Vec<(&String, &String)> = self.context.iter().collect();
        entries.sort();
        w.write_u32(entries.len() as u32);
        for (key, value) in entries {
            w.write_string(key);
            w.write_string(value);
        }
    }
}
