//! Editor model override precedence.

/// Combine an explicit caller-supplied model, the secrets suggestion, and the
/// built-in fallback into one effective value.
///
/// The explicit value wins only when it signals explicit intent, i.e. it is
/// non-empty and differs from the built-in default. An explicit value equal
/// to the default is treated as "not overridden", so a present suggestion
/// wins that tie-break (see the regression test below for the quirk).
pub fn choose_editor_model(
    explicit: &str,
    builtin_default: &str,
    suggested: Option<&str>,
) -> String {
    let explicit = explicit.trim();
    if !explicit.is_empty() && explicit != builtin_default {
        return explicit.to_string();
    }
    if let Some(suggested) = suggested.map(str::trim).filter(|value| !value.is_empty()) {
        return suggested.to_string();
    }
    builtin_default.to_string()
}
