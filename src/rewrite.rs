//! Signal rewrite map: `--rewrite FROM:TO` rules layered over the
//! job-control defaults.
//!
//! The map is a total function over the standard signal set: a signal
//! without an explicit entry translates to itself. It is built once at
//! startup and read-only afterwards.

use std::collections::HashMap;

use nix::sys::signal::Signal;

use crate::error::Error;

/// Where a translated signal ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Signal(Signal),
    /// Swallow the signal entirely (`TO` given as `NONE`).
    Drop,
}

/// Total mapping from deliverable signal to forwarding target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMap {
    entries: HashMap<Signal, Target>,
}

impl SignalMap {
    /// Build the map from raw `FROM:TO` rules.
    ///
    /// Defaults are inserted first, then user rules on top, so an explicit
    /// rewrite of TSTP/TTIN/TTOU overrides the built-in STOP mapping.
    pub fn build(rewrites: &[String]) -> Result<Self, Error> {
        let mut entries = HashMap::new();

        // In a new session the child's foreground group is orphaned and the
        // kernel suppresses default job-control behavior for these three, so
        // forwarding them unchanged would be a no-op. STOP obtains the
        // intended suspension.
        entries.insert(Signal::SIGTSTP, Target::Signal(Signal::SIGSTOP));
        entries.insert(Signal::SIGTTIN, Target::Signal(Signal::SIGSTOP));
        entries.insert(Signal::SIGTTOU, Target::Signal(Signal::SIGSTOP));

        for rule in rewrites {
            let (from, to) = rule
                .split_once(':')
                .ok_or_else(|| Error::BadRewrite(rule.clone()))?;
            entries.insert(parse_signal(from)?, parse_target(to)?);
        }

        Ok(SignalMap { entries })
    }

    /// Translate a delivered signal to its forwarding target.
    pub fn translate(&self, sig: Signal) -> Target {
        self.entries
            .get(&sig)
            .copied()
            .unwrap_or(Target::Signal(sig))
    }
}

/// Parse a signal name: case-insensitive, `SIG` prefix optional.
///
/// Numeric forms are deliberately not accepted.
fn parse_signal(name: &str) -> Result<Signal, Error> {
    let upper = name.trim().to_ascii_uppercase();
    let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
    if bare.is_empty() {
        return Err(Error::BadSignalName(name.to_string()));
    }
    Signal::iterator()
        .find(|sig| &sig.as_str()[3..] == bare)
        .ok_or_else(|| Error::BadSignalName(name.to_string()))
}

/// Parse the TO side of a rule; `NONE` means drop.
fn parse_target(name: &str) -> Result<Target, Error> {
    if name.trim().eq_ignore_ascii_case("none") {
        return Ok(Target::Drop);
    }
    Ok(Target::Signal(parse_signal(name)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(rules: &[&str]) -> SignalMap {
        let rules: Vec<String> = rules.iter().map(|s| s.to_string()).collect();
        SignalMap::build(&rules).expect("build signal map")
    }

    #[test]
    fn unmapped_signals_translate_to_themselves() {
        let map = build(&[]);
        assert_eq!(
            map.translate(Signal::SIGTERM),
            Target::Signal(Signal::SIGTERM)
        );
        assert_eq!(
            map.translate(Signal::SIGUSR1),
            Target::Signal(Signal::SIGUSR1)
        );
        assert_eq!(map.translate(Signal::SIGHUP), Target::Signal(Signal::SIGHUP));
    }

    #[test]
    fn job_control_trio_defaults_to_stop() {
        let map = build(&[]);
        for sig in [Signal::SIGTSTP, Signal::SIGTTIN, Signal::SIGTTOU] {
            assert_eq!(map.translate(sig), Target::Signal(Signal::SIGSTOP));
        }
    }

    #[test]
    fn user_rewrite_overrides_default() {
        let map = build(&["tstp:tstp"]);
        assert_eq!(
            map.translate(Signal::SIGTSTP),
            Target::Signal(Signal::SIGTSTP)
        );
        // The other two defaults are untouched.
        assert_eq!(
            map.translate(Signal::SIGTTIN),
            Target::Signal(Signal::SIGSTOP)
        );
    }

    #[test]
    fn names_are_case_insensitive_with_optional_prefix() {
        for rule in ["term:quit", "TERM:QUIT", "SIGterm:sigQUIT", "SigTerm:Quit"] {
            let map = build(&[rule]);
            assert_eq!(
                map.translate(Signal::SIGTERM),
                Target::Signal(Signal::SIGQUIT),
                "rule {rule:?}"
            );
        }
    }

    #[test]
    fn none_target_drops_the_signal() {
        let map = build(&["int:none", "usr1:NONE"]);
        assert_eq!(map.translate(Signal::SIGINT), Target::Drop);
        assert_eq!(map.translate(Signal::SIGUSR1), Target::Drop);
    }

    #[test]
    fn none_is_not_a_valid_source() {
        let rules = vec!["none:term".to_string()];
        assert!(matches!(
            SignalMap::build(&rules),
            Err(Error::BadSignalName(_))
        ));
    }

    #[test]
    fn numeric_names_are_rejected() {
        let rules = vec!["15:term".to_string()];
        assert!(matches!(
            SignalMap::build(&rules),
            Err(Error::BadSignalName(_))
        ));
    }

    #[test]
    fn missing_colon_is_a_bad_rewrite() {
        let rules = vec!["term".to_string()];
        assert!(matches!(SignalMap::build(&rules), Err(Error::BadRewrite(_))));
    }

    #[test]
    fn unknown_names_are_rejected_on_either_side() {
        for rule in ["bogus:term", "term:bogus"] {
            let rules = vec![rule.to_string()];
            assert!(
                matches!(SignalMap::build(&rules), Err(Error::BadSignalName(_))),
                "rule {rule:?}"
            );
        }
    }

    #[test]
    fn same_inputs_build_equal_maps() {
        let rules = ["term:quit", "int:none"];
        assert_eq!(build(&rules), build(&rules));
        assert_eq!(build(&[]), build(&[]));
    }
}
