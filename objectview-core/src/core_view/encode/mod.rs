/*
    Encode subsystem - Local edits to hub commands

    Field maps describe how each logical field of a view is written back;
    the encoder turns field values into commands and diffs two states.
*/

pub mod command;
pub mod encoder;
pub mod field_map;

pub use command::{compare_values, Command};
pub use encoder::{copy_fields, encode_diff, encode_set, ChangeSet};
pub use field_map::{Accessor, ArgDescriptor, FieldMap};
