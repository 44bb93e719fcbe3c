//! Public API
//!
//! One-call encode/decode on top of [`Pickler`] and [`Unpickler`], plus file
//! wrappers.

use std::io::{Read, Write};
use std::path::Path;

use deeppickle_vm::{Interpreter, Value};

use crate::config::EncoderConfig;
use crate::error::PickleResult;
use crate::pickler::Pickler;
use crate::unpickler::Unpickler;

/// Encode `value` with the default configuration.
///
/// `__reduce__` hooks of user classes run inside `interp`.
pub fn dumps(interp: &mut Interpreter, value: &Value) -> PickleResult<Vec<u8>> {
    dumps_with(interp, value, &EncoderConfig::default())
}

/// Encode `value` with an explicit configuration
pub fn dumps_with(interp: &mut Interpreter, value: &Value, config: &EncoderConfig) -> PickleResult<Vec<u8>> {
    config.validate()?;
    let mut pickler = Pickler::new(interp, config);
    pickler.dump(value)?;
    Ok(pickler.finish())
}

/// Decode a stream, calling constructors inside `interp`
pub fn loads(interp: &mut Interpreter, data: &[u8]) -> PickleResult<Value> {
    Ok(Unpickler::new(interp, data).load()?)
}

// ============================================================================
// Convenience functions
// ============================================================================

/// Encode a value to a file
pub fn dump_file(path: impl AsRef<Path>, interp: &mut Interpreter, value: &Value) -> PickleResult<()> {
    let bytes = dumps(interp, value)?;
    let file = std::fs::File::create(path.as_ref())?;
    let mut writer = std::io::BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Decode a value from a file
pub fn load_file(path: impl AsRef<Path>, interp: &mut Interpreter) -> PickleResult<Value> {
    let file = std::fs::File::open(path.as_ref())?;
    let mut reader = std::io::BufReader::new(file);
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    loads(interp, &bytes)
}
