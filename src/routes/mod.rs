/// Router Module Index
///
/// Routes are split by the access rule that covers them. The split documents
/// intent only: enforcement happens in the policy middleware wrapped around the
/// whole router, so a route placed in the wrong module is still protected by
/// the catch-all rule.

/// Routes opened by a public rule (login, API docs).
pub mod public;

/// Routes that require a bearer token.
pub mod authenticated;
