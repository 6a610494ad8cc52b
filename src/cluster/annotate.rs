//! Caller annotation for statements.
//!
//! Statements issued through the façade are prefixed with a SQL comment naming
//! the call site, so slow-query logs and `pg_stat_activity` point back at code:
//!
//! ```text
//! /* src/users/store.rs:42:18 */
//! select * from users where id = $1
//! ```

use std::borrow::Cow;
use std::panic::Location;

/// Prefix `sql` with the caller location when `enabled`.
pub(crate) fn annotate<'a>(sql: &'a str, caller: &Location<'_>, enabled: bool) -> Cow<'a, str> {
    if !enabled {
        return Cow::Borrowed(sql);
    }
    // A stray terminator in a path would end the comment early.
    let file = caller.file().replace("*/", "*\\/");
    Cow::Owned(format!(
        "/* {}:{}:{} */\n{}",
        file,
        caller.line(),
        caller.column(),
        sql
    ))
}
