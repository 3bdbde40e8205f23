/// Per-solve overrides. Unset fields fall back to what the instance recorded
/// at instantiation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolveOptions {
    solver: Option<String>,
    opt_file: Option<i32>,
    no_match_limit: usize,
    debug: bool,
}

impl SolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn solver(mut self, solver: impl Into<String>) -> Self {
        self.solver = Some(solver.into());
        self
    }

    pub fn opt_file(mut self, opt_file: i32) -> Self {
        self.opt_file = Some(opt_file);
        self
    }

    /// Unmatched data records tolerated across all modifiers of one solve.
    pub fn no_match_limit(mut self, limit: usize) -> Self {
        self.no_match_limit = limit;
        self
    }

    /// Also run the `convert` dump pass after the solve.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn solver_override(&self) -> Option<&str> {
        self.solver.as_deref()
    }

    pub fn opt_file_override(&self) -> Option<i32> {
        self.opt_file
    }

    pub fn limit(&self) -> usize {
        self.no_match_limit
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }
}
