//! The translator context (spec §5, §9): the mutable state threaded by
//! mutable reference through every lowering component, plus [`Config`] (spec
//! §6 "Environment / configuration") and [`import_ports`] (spec §11, grounded
//! on the real frontend's `ReadUHDMPass::execute`).

use std::collections::HashMap;

use crate::error::{Diagnostic, DiagnosticKind, ErrorHandler, Severity, SourceLoc, UHDM_FORCING_UNSIGNED_TYPE};
use crate::hdl::{Direction, Port, TaskDecl};
use crate::{Constant, Module, SigSpec, Wire};

/// The three toggles spec.md §6 names under "Environment / configuration".
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// `mode_debug`: verbose logging of lowering decisions.
    pub mode_debug: bool,
    /// `allowFormal`: accept `assume`/`cover`/`restrict`/`immediate_assume`
    /// instead of flagging them as non-synthesizable.
    pub allow_formal: bool,
    /// `reportErrors`: whether SynthAudit findings are reported through the
    /// error handler (set false to silently continue).
    pub report_errors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode_debug: false,
            allow_formal: false,
            report_errors: true,
        }
    }
}

/// The auto-ID counter, value-tracking map, loop-variable substitution map,
/// name-resolution shadow stack, signal-to-temp-wire map, and pending
/// sync-assignment map described in spec §5 and §9, bundled behind one
/// mutable-reference context so lowering components don't each carry their
/// own copy of shared, process-wide state.
pub struct Translator {
    /// configuration toggles
    pub config: Config,
    /// process-wide, monotonic counter shared across the whole translation
    /// unit (spec §5: "do not reset it per module").
    autoidx: u64,
    /// current symbolic value per signal name (§4.5's value-tracking map).
    value_map: HashMap<String, SigSpec>,
    /// loop-variable substitution, threaded through expression lowering
    /// while unrolling (§4.7).
    loop_vars: HashMap<String, i64>,
    /// block-local name resolution, pushed/popped as named-begin scopes are
    /// entered/exited (§4.5).
    name_shadow: Vec<HashMap<String, String>>,
    /// signal name -> its `$0\name` temp wire, for the process currently
    /// under construction.
    temp_wires: HashMap<String, SigSpec>,
    /// pending sync-rule assignment per LHS, used while merging if/else
    /// branches under a synchronous clock (§5's "pending sync-assignment
    /// map").
    pending_sync: HashMap<String, SigSpec>,
    /// task definitions in scope for the module currently being lowered,
    /// keyed by name, used by the shared statement dispatcher to inline
    /// `TaskCall` statements (§4.5/§4.6).
    tasks: HashMap<String, TaskDecl>,
    /// collected diagnostics, delivered to `handler` as they're raised.
    handler: Box<dyn ErrorHandler>,
}

impl Translator {
    /// A fresh translator with the given configuration and diagnostic
    /// handler. The autoidx counter starts at 0 and is never reset.
    pub fn new(config: Config, handler: Box<dyn ErrorHandler>) -> Self {
        Translator {
            config,
            autoidx: 0,
            value_map: HashMap::new(),
            loop_vars: HashMap::new(),
            name_shadow: Vec::new(),
            temp_wires: HashMap::new(),
            pending_sync: HashMap::new(),
            tasks: HashMap::new(),
            handler,
        }
    }

    /// Allocate the next autoidx value. Process-wide and monotonic: callers
    /// must not reset this between modules.
    pub fn next_autoidx(&mut self) -> u64 {
        let id = self.autoidx;
        self.autoidx += 1;
        id
    }

    /// Report a non-fatal diagnostic through the configured handler,
    /// honoring `config.report_errors`.
    pub fn report(&mut self, severity: Severity, kind: DiagnosticKind, message: impl Into<String>, src: SourceLoc) {
        if !self.config.report_errors {
            return;
        }
        self.handler.on_diagnostic(&Diagnostic {
            severity,
            kind,
            message: message.into(),
            src,
        });
    }

    /// Report the fixed `UHDM_FORCING_UNSIGNED_TYPE` diagnostic for a
    /// sign-qualifier conflict (spec §7).
    pub fn report_sign_conflict(&mut self, port: &str, src: SourceLoc) {
        self.report(
            Severity::Error,
            DiagnosticKind::SignQualifierConflict,
            format!("{}: {}", UHDM_FORCING_UNSIGNED_TYPE, port),
            src,
        );
    }

    /// Record the current symbolic value of `name` (blocking-assignment
    /// semantics mutate this; nonblocking assignments must not call this).
    pub fn track_value(&mut self, name: impl Into<String>, value: SigSpec) {
        self.value_map.insert(name.into(), value);
    }

    /// Look up the tracked value for `name`, if any assignment has been
    /// tracked for it in the current process.
    pub fn tracked_value(&self, name: &str) -> Option<&SigSpec> {
        self.value_map.get(name)
    }

    /// Clear all tracked values; called between processes.
    pub fn clear_value_map(&mut self) {
        self.value_map.clear();
    }

    /// Substitute a loop variable for unrolling (§4.7's loop-variable
    /// substitution map).
    pub fn bind_loop_var(&mut self, name: impl Into<String>, value: i64) {
        self.loop_vars.insert(name.into(), value);
    }

    /// Remove a loop-variable binding once its unrolled iteration is done.
    pub fn unbind_loop_var(&mut self, name: &str) {
        self.loop_vars.remove(name);
    }

    /// Current binding for a loop variable, if any.
    pub fn loop_var(&self, name: &str) -> Option<i64> {
        self.loop_vars.get(name).copied()
    }

    /// Push a new block-local name-resolution scope (entering a
    /// named-begin).
    pub fn push_scope(&mut self) {
        self.name_shadow.push(HashMap::new());
    }

    /// Pop the innermost block-local scope (leaving a named-begin).
    pub fn pop_scope(&mut self) {
        self.name_shadow.pop();
    }

    /// Bind `name` to its hierarchical wire name within the innermost open
    /// scope; panics if no scope is open (callers must `push_scope` first).
    pub fn bind_local(&mut self, name: impl Into<String>, resolved: impl Into<String>) {
        self.name_shadow
            .last_mut()
            .expect("bind_local called with no open scope")
            .insert(name.into(), resolved.into());
    }

    /// Resolve `name` against the shadow stack (innermost scope first),
    /// falling back to `name` itself (module-scope) if unshadowed.
    pub fn resolve_name(&self, name: &str) -> String {
        for scope in self.name_shadow.iter().rev() {
            if let Some(resolved) = scope.get(name) {
                return resolved.clone();
            }
        }
        name.to_string()
    }

    /// Record the `$0\name` temp wire for `signal` in the process currently
    /// under construction.
    pub fn set_temp_wire(&mut self, signal: impl Into<String>, temp: SigSpec) {
        self.temp_wires.insert(signal.into(), temp);
    }

    /// The temp wire previously recorded for `signal`, if any.
    pub fn temp_wire(&self, signal: &str) -> Option<&SigSpec> {
        self.temp_wires.get(signal)
    }

    /// Clear the signal-to-temp-wire map; called between processes.
    pub fn clear_temp_wires(&mut self) {
        self.temp_wires.clear();
    }

    /// Record a pending sync-rule assignment for `lhs`, overwriting any
    /// earlier one in the same branch (last-writer-wins, spec §5).
    pub fn set_pending_sync(&mut self, lhs: impl Into<String>, rhs: SigSpec) {
        self.pending_sync.insert(lhs.into(), rhs);
    }

    /// Drain the pending sync-assignment map, in no particular order (callers
    /// that need source order should sort by an external action list
    /// instead of relying on map iteration order).
    pub fn drain_pending_sync(&mut self) -> HashMap<String, SigSpec> {
        std::mem::take(&mut self.pending_sync)
    }

    /// Replace the task definitions in scope, called once per module before
    /// any of its processes are lowered.
    pub(crate) fn set_tasks(&mut self, tasks: HashMap<String, TaskDecl>) {
        self.tasks = tasks;
    }

    /// Look up a task definition by name, for the `TaskCall` dispatcher arm.
    pub(crate) fn task(&self, name: &str) -> Option<&TaskDecl> {
        self.tasks.get(name)
    }
}

/// Build a [`Module`]'s ports and internal nets from an [`crate::hdl::HdlModule`],
/// mirroring `ReadUHDMPass::execute`'s wire-import shape: ports get
/// `input`/`output`/`inout` flags and are added in declaration order, nets
/// that aren't already present get plain wires, and continuous assigns
/// become `Module::connections` entries.
pub fn import_ports(hdl_module: &crate::hdl::HdlModule) -> Module {
    let mut module = Module::empty();
    for port in &hdl_module.ports {
        let mut wire = Wire::with_width(port.width);
        match port.direction {
            Direction::Input => wire.input = true,
            Direction::Output => wire.output = true,
            Direction::Inout => {
                wire.input = true;
                wire.output = true;
                wire.inout = true;
            }
        }
        wire.signed = port.signed;
        module.wires_mut().insert(port.name.clone(), wire);
    }
    for net in &hdl_module.nets {
        module
            .wires_mut()
            .entry(net.name.clone())
            .or_insert_with(|| Wire::with_width(net.width));
    }
    for mem in &hdl_module.memories {
        module.memories.insert(
            mem.name.clone(),
            crate::Memory {
                width: mem.width,
                size: mem.size,
                offset: 0,
                attributes: HashMap::new(),
            },
        );
    }
    for (lhs, rhs) in &hdl_module.cont_assigns {
        module
            .connections_mut()
            .push((SigSpec::wire(lhs.clone()), SigSpec::wire(rhs.clone())));
    }
    module
}

/// Detect and report a sign-qualifier conflict on a port (§4.8 rewrite 5):
/// a port whose low-conn is unsigned but whose high-conn carries `signed`.
/// Returns the corrected `Port` with the signed flag cleared.
pub fn strip_signed_if_conflicting(port: &Port, low_conn_signed: bool, translator: &mut Translator) -> Port {
    if port.signed && !low_conn_signed {
        translator.report_sign_conflict(&port.name, SourceLoc::default());
        Port {
            signed: false,
            ..port.clone()
        }
    } else {
        port.clone()
    }
}

/// Stamp the `src = "file:line"` attribute spec §6 requires on emitted
/// objects' attribute maps.
pub fn src_attr(loc: &SourceLoc) -> (String, Constant) {
    ("src".to_string(), Constant::String(loc.to_string()))
}

/// Classify `block` and dispatch it to the matching lowering component
/// (spec §2's "data flow": ProcessClassifier picks one of {async-reset-FF,
/// SR-FF, FF, comb, initial}, then the selected component emits a process).
pub fn lower_process(block: &crate::hdl::ProceduralBlock, module: &mut Module, translator: &mut Translator) -> crate::Process {
    let classification = crate::classify::classify(block);
    match classification.kind {
        crate::ProcessKind::AsyncResetFf | crate::ProcessKind::SrFf => {
            crate::async_reset::lower(block, &classification, module, translator)
        }
        crate::ProcessKind::Ff => crate::ff::lower(block, &classification, module, translator),
        crate::ProcessKind::Comb => crate::comb::lower(block, module, translator),
        crate::ProcessKind::InitialSync => crate::initial::lower_sync(block, module, translator),
        crate::ProcessKind::InitialComb => crate::initial::lower_comb(block, module, translator),
        crate::ProcessKind::InitialInterpreted => crate::initial::lower_interpreted(block, module, translator),
    }
}

/// Import a whole [`crate::hdl::HdlModule`] (ports, nets, memories,
/// continuous assigns) and lower every procedural block it contains,
/// naming each resulting process `$proc$<index>` in source order. This is
/// the entry point the CLI drives (spec §6/§10.5): callers that only have a
/// single [`crate::hdl::ProceduralBlock`] should call [`lower_process`]
/// directly against a module they've already built.
///
/// Runs [`crate::rewrite::run_all`] over a local copy of `hdl_module` before
/// lowering (spec: "RewriteEngine operates in-place on the UHDM tree before
/// behavioral lowering") — the caller's tree is left untouched.
pub fn lower_module(hdl_module: &crate::hdl::HdlModule, translator: &mut Translator) -> Module {
    let mut hdl_module = hdl_module.clone();
    crate::rewrite::run_all(&mut hdl_module, translator);
    translator.set_tasks(hdl_module.tasks.iter().map(|t| (t.name.clone(), t.clone())).collect());

    let mut module = import_ports(&hdl_module);
    for (i, block) in hdl_module.procs.iter().enumerate() {
        translator.clear_value_map();
        translator.clear_temp_wires();
        let process = lower_process(block, &mut module, translator);
        module.processes_mut().insert(format!("$proc${}", i), process);
    }
    module
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingHandler;

    fn translator() -> Translator {
        Translator::new(Config::default(), Box::new(CollectingHandler::new()))
    }

    #[test]
    fn autoidx_is_monotonic_and_never_resets() {
        let mut t = translator();
        assert_eq!(t.next_autoidx(), 0);
        assert_eq!(t.next_autoidx(), 1);
        assert_eq!(t.next_autoidx(), 2);
    }

    #[test]
    fn scopes_shadow_and_restore() {
        let mut t = translator();
        assert_eq!(t.resolve_name("tmp"), "tmp");
        t.push_scope();
        t.bind_local("tmp", "blockname.tmp");
        assert_eq!(t.resolve_name("tmp"), "blockname.tmp");
        t.pop_scope();
        assert_eq!(t.resolve_name("tmp"), "tmp");
    }

    #[test]
    fn value_tracking_round_trips() {
        let mut t = translator();
        assert!(t.tracked_value("a").is_none());
        t.track_value("a", SigSpec::wire("b"));
        assert_eq!(t.tracked_value("a"), Some(&SigSpec::wire("b")));
    }

    #[test]
    fn lower_module_dispatches_ff_and_async_reset_processes() {
        let hdl_module = crate::hdl::parse_fixture(
            r#"
            module top;
            port input 1 clk;
            port input 1 rst_n;
            port input 8 d;
            port output 8 q;
            port output 8 count;
            always @(posedge clk)
            begin
                q <= d;
            end
            always @(posedge clk or negedge rst_n)
            if (!rst_n)
                count <= 0;
            else
                count <= count + 1;
            endmodule
            "#,
        )
        .unwrap();
        let mut t = translator();
        let module = lower_module(&hdl_module, &mut t);
        assert_eq!(module.processes().len(), 2);
        let dff = module.processes().get("$proc$0").unwrap();
        assert_eq!(dff.syncs().len(), 1);
        let counter = module.processes().get("$proc$1").unwrap();
        assert_eq!(counter.syncs().len(), 2);
    }

    #[test]
    fn lower_module_clears_temp_wires_between_processes() {
        // Two processes assigning the same signal name: without clearing the
        // temp-wire cache per process, the second process would inherit the
        // first's `$0\y` registration and skip seeding its own copy.
        let hdl_module = crate::hdl::parse_fixture(
            r#"
            module dup;
            port input 8 a;
            port input 8 b;
            port output 8 y;
            always @(*)
            y = a;
            always @(*)
            y = b;
            endmodule
            "#,
        )
        .unwrap();
        let mut t = translator();
        let module = lower_module(&hdl_module, &mut t);
        assert_eq!(module.processes().len(), 2);
        for proc in module.processes().values() {
            assert_eq!(proc.syncs()[0].updates().len(), 1);
        }
        assert!(t.temp_wire("y").is_none());
    }

    #[test]
    fn task_call_is_inlined_at_the_call_site() {
        let hdl_module = crate::hdl::parse_fixture(
            r#"
            module m;
            port input 8 a;
            port input 8 b;
            port output 8 y;
            task addinto(x, z);
            y = x + z;
            endtask
            always @(*)
            addinto(a, b);
            endmodule
            "#,
        )
        .unwrap();
        let mut t = translator();
        let module = lower_module(&hdl_module, &mut t);
        assert_eq!(module.processes().len(), 1);
        assert!(module.wires().contains_key("addinto$x"));
        assert!(module.wires().contains_key("addinto$z"));
        let proc = module.processes().get("$proc$0").unwrap();
        assert!(proc.syncs()[0].updates().iter().any(|(lhs, _)| *lhs == SigSpec::wire("y")));
    }

    #[test]
    fn import_ports_sets_direction_flags() {
        let hdl_module = crate::hdl::parse_fixture(
            r#"
            module m;
            port input 8 d;
            port output 8 q;
            always @(posedge clk)
            begin
                q <= d;
            end
            endmodule
            "#,
        )
        .unwrap();
        let module = import_ports(&hdl_module);
        assert!(module.wires().get("d").unwrap().input);
        assert!(module.wires().get("q").unwrap().output);
    }
}
