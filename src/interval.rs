// src/interval.rs
use crate::config::sources::SourceDescriptor;

/// Poll interval used when neither the process nor the source overrides it.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Lower bound for any effective interval.
pub const MIN_INTERVAL_SECS: u64 = 10;

/// Resolve the poll interval for `source` from its environment override.
pub fn resolve(source: &SourceDescriptor, default_secs: u64) -> u64 {
    let raw = std::env::var(&source.interval_env).ok();
    let secs = resolve_value(raw.as_deref(), default_secs);
    tracing::info!(
        source = %source.name,
        env = %source.interval_env,
        interval_secs = secs,
        "next check in {secs} seconds"
    );
    secs
}

/// Pure resolution step: parse `raw`, fall back to `default_secs`, clamp to
/// [`MIN_INTERVAL_SECS`]. Never fails.
pub fn resolve_value(raw: Option<&str>, default_secs: u64) -> u64 {
    let secs = match raw.map(str::trim) {
        None | Some("") => default_secs,
        Some(s) => match s.parse::<i64>() {
            Ok(v) => v.max(0) as u64,
            Err(_) => {
                tracing::warn!(value = %s, default_secs, "invalid interval override, using default");
                default_secs
            }
        },
    };
    clamp(secs)
}

/// Clamp to the floor, with a diagnostic when that changes the value.
pub fn clamp(secs: u64) -> u64 {
    if secs < MIN_INTERVAL_SECS {
        tracing::warn!(
            requested_secs = secs,
            floor_secs = MIN_INTERVAL_SECS,
            "interval too small, clamping to floor"
        );
        MIN_INTERVAL_SECS
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_below_floor_clamp() {
        for v in [-5i64, 0, 1, 5, 9] {
            let s = v.to_string();
            assert_eq!(resolve_value(Some(&s), DEFAULT_INTERVAL_SECS), 10, "v={v}");
        }
    }

    #[test]
    fn values_at_or_above_floor_pass_through() {
        for v in [10u64, 11, 60, 300, 86_400] {
            let s = v.to_string();
            assert_eq!(resolve_value(Some(&s), DEFAULT_INTERVAL_SECS), v);
        }
    }

    #[test]
    fn absent_or_garbage_uses_default() {
        assert_eq!(resolve_value(None, 60), 60);
        assert_eq!(resolve_value(Some(""), 60), 60);
        assert_eq!(resolve_value(Some("five"), 60), 60);
        assert_eq!(resolve_value(Some("1.5"), 60), 60);
    }

    #[test]
    fn default_is_clamped_too() {
        assert_eq!(resolve_value(None, 3), 10);
    }
}
