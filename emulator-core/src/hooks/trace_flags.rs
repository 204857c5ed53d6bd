/// Per-instance trace toggles (spec "Design Notes: Global tracing mode").
/// No process-wide state: each `Emulator` carries its own flags so two
/// emulators in one process stay independently configurable.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceFlags {
    pub verbose: bool,
    pub trace_sys: bool,
    pub trace_mem: bool,
    pub trace_exec: bool,
    pub trace_reg: bool,
}
