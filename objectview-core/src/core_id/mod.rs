/*
    core_id - Compact unique object ids

    Ids are 27 characters over `0-9A-Za-z._`, encoding a 160-bit value:

        | host word | seconds | nanoseconds | process word | sequence |
        |   32 bits | 32 bits |     32 bits |      32 bits |  32 bits |

    Object ids append the type name: `<id>:<type>`.
*/

pub mod creator;

pub use creator::{encode_id, IdCreator, ID_LENGTH};
