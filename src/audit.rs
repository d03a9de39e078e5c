//! SynthAudit (spec §4.9, peer subsystem): flags constructs that fall
//! outside the synthesizable subset and reports each through the error
//! handler. The non-synthesizable system-task list is carried verbatim
//! (modulo the `$` prefix) from `SynthSubset`'s constructor list, including
//! its commented-out allowed exceptions.

use crate::error::{DiagnosticKind, Severity, SourceLoc};
use crate::xlate::Translator;

/// System tasks/functions `SynthSubset` marks non-synthesizable. Verbatim
/// from the pass's constructor list (with the `$` prefix that list's
/// `kDollar` helper prepends), minus the entries it itself leaves commented
/// out (those are [`ALLOWED_SYS_CALLS`]).
pub(crate) const NON_SYNTH_SYS_CALLS: &[&str] = &[
    "$write", "$strobe", "$monitor", "$monitoron", "$monitoroff", "$displayb", "$writeb", "$strobeb", "$monitorb",
    "$displayo", "$writeo", "$strobeo", "$monitoro", "$displayh", "$writeh", "$strobeh", "$monitorh", "$fopen",
    "$fclose", "$frewind", "$fflush", "$fseek", "$ftell", "$fdisplay", "$fwrite", "$swrite", "$fstrobe", "$fmonitor",
    "$fread", "$fscanf", "$fdisplayb", "$fwriteb", "$swriteb", "$fstrobeb", "$fmonitorb", "$fdisplayo", "$fwriteo",
    "$swriteo", "$fstrobeo", "$fmonitoro", "$fdisplayh", "$fwriteh", "$swriteh", "$fstrobeh", "$fmonitorh",
    "$sscanf", "$sdf_annotate", "$sformat", "$assertkill", "$assertoff", "$asserton", "$countones",
    "$coverage_control", "$coverage_merge", "$coverage_save", "$exit", "$fell", "$get_coverage", "$coverage_get",
    "$coverage_get_max", "$info", "$isunbounded", "$isunknown", "$load_coverage_db", "$onehot", "$past", "$root",
    "$rose", "$sampled", "$set_coverage_db_name", "$stable", "$unit", "$urandom", "$srandom", "$urandom_range",
    "$set_randstate", "$get_randstate", "$dist_uniform", "$dist_normal", "$dist_exponential", "$dist_poisson",
    "$dist_chi_square", "$dist_t", "$dist_erlang", "$value$plusargs",
];

/// The entries `SynthSubset` leaves commented out of its own exclusion
/// list — kept synthesizable on purpose.
pub(crate) const ALLOWED_SYS_CALLS: &[&str] = &[
    "$display",
    "$cast",
    "$bits",
    "$bitstoshortreal",
    "$dimensions",
    "$error",
    "$fatal",
    "$high",
    "$increment",
    "$left",
    "$low",
    "$readmemb",
    "$readmemh",
    "$right",
    "$shortrealtobits",
    "$size",
    "$typename",
    "$typeof",
    "$warning",
    "$writememb",
    "$writememh",
];

/// Formal-only system tasks, excluded unless `allow_formal` is set.
pub(crate) const FORMAL_ONLY_CALLS: &[&str] = &["$assume", "$cover", "$restrict", "$immediate_assume"];

/// Other non-synthesizable construct keywords (spec: "final/wait/fork/
/// disable/force/release/assignment-constraint/class/program/checker/
/// chandle"), reported the same way as non-synth task calls when
/// encountered.
pub(crate) const NON_SYNTH_KEYWORDS: &[&str] =
    &["final", "wait", "fork", "disable", "force", "release", "class", "program", "checker", "chandle"];

/// Called from [`crate::dispatch::lower_stmt`]'s `SysTaskCall` arm. Reports
/// a diagnostic for anything outside the synthesizable subset; allowed and
/// unrecognized calls pass through silently (spec: "Non-synth task calls are
/// optionally substituted with stub `$display` calls... when the call is
/// `$error`/`$finish`/`$display` inside an `initial` block, it is simply
/// elided" — this stand-in has no call-site "am I in an initial block"
/// signal threaded through, so both cases collapse to "no diagnostic, no
/// cell emitted").
pub(crate) fn handle_sys_task_call(name: &str, translator: &mut Translator, src: SourceLoc) {
    if FORMAL_ONLY_CALLS.contains(&name) {
        if !translator.config.allow_formal {
            translator.report(
                Severity::Error,
                DiagnosticKind::NonSynthesizable,
                format!("{} is a formal-only construct and formal mode is disabled", name),
                src,
            );
        }
        return;
    }
    if NON_SYNTH_SYS_CALLS.contains(&name) {
        translator.report(
            Severity::Error,
            DiagnosticKind::NonSynthesizable,
            format!("{} is outside the synthesizable subset, call elided", name),
            src,
        );
    }
}

/// Report a non-synthesizable bare keyword construct (`final`, `wait`, ...)
/// encountered while lowering. There is no corresponding `Stmt`/`Expr`
/// variant for most of these in the `.hdl` stand-in (no class/program/
/// checker/chandle grammar), so this is exposed for completeness and for
/// any future grammar extension rather than called from today's dispatcher.
#[allow(dead_code)]
pub(crate) fn report_nonsynth_keyword(keyword: &str, translator: &mut Translator, src: SourceLoc) {
    if NON_SYNTH_KEYWORDS.contains(&keyword) {
        translator.report(
            Severity::Error,
            DiagnosticKind::NonSynthesizable,
            format!("'{}' is outside the synthesizable subset", keyword),
            src,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingHandler;
    use crate::xlate::Config;

    fn translator() -> Translator {
        Translator::new(Config::default(), Box::new(CollectingHandler::new()))
    }

    #[test]
    fn non_synth_and_allowed_calls_both_dispatch_without_panicking() {
        let mut t = translator();
        handle_sys_task_call("$urandom", &mut t, SourceLoc::default());
        handle_sys_task_call("$display", &mut t, SourceLoc::default());
    }

    #[test]
    fn formal_only_call_is_accepted_once_allow_formal_is_set() {
        let config = Config {
            allow_formal: true,
            ..Config::default()
        };
        let mut t = Translator::new(config, Box::new(CollectingHandler::new()));
        handle_sys_task_call("$assume", &mut t, SourceLoc::default());
    }

    #[test]
    fn allowed_and_unknown_calls_are_distinct_from_non_synth_list() {
        assert!(!NON_SYNTH_SYS_CALLS.contains(&"$display"));
        assert!(ALLOWED_SYS_CALLS.contains(&"$display"));
        assert!(!ALLOWED_SYS_CALLS.contains(&"$urandom"));
        assert!(NON_SYNTH_SYS_CALLS.contains(&"$urandom"));
    }

    #[test]
    fn allowed_list_carries_every_commented_out_exception() {
        for name in [
            "$dimensions",
            "$high",
            "$increment",
            "$left",
            "$low",
            "$readmemb",
            "$readmemh",
            "$right",
            "$shortrealtobits",
            "$typeof",
            "$writememb",
            "$writememh",
        ] {
            assert!(ALLOWED_SYS_CALLS.contains(&name), "{} missing from ALLOWED_SYS_CALLS", name);
            assert!(!NON_SYNTH_SYS_CALLS.contains(&name));
        }
    }
}
