//! Built-in loaders.
//!
//! | family | `base_type` | node |
//! |---|---|---|
//! | `None`, `bool`, `int`, `float`, `complex` | same as family | unfiltered scalar dataset |
//! | `str`, `bytes` | same as family | utf8 / opaque dataset |
//! | `list`, `tuple`, `set` | same as family | flat dataset or group of `data<i>` |
//! | `dict` | `dict` | group keyed by entry |
//! | `ndarray` | `ndarray` | array dataset |
//! | user objects (opt-in) | `object` | group of fields |

mod arrays;
mod dicts;
mod names;
mod objects;
mod scalars;
mod sequences;

use crate::registry::LoaderEntry;

/// Every built-in entry, in registration order.
pub(crate) fn builtin_entries() -> Vec<LoaderEntry> {
    let mut entries = scalars::entries();
    entries.extend(sequences::entries());
    entries.extend(dicts::entries());
    entries.extend(arrays::entries());
    entries.extend(objects::entries());
    entries
}
