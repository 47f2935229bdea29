//! The dictionary compiled into the crate: device, media, PTZ, imaging, events and
//! access control, each with the operations most clients need.

use crate::SchemaError;
use crate::schema::Dictionary;

pub const BUILTIN_DICTIONARY: &str = include_str!("../resources/catalogue.json");

pub fn builtin_dictionary() -> Result<Dictionary, SchemaError> {
    Dictionary::from_json(BUILTIN_DICTIONARY)
}
