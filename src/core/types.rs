use super::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a symbol held in a sync store or a compiled model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Set,
    Parameter,
    Variable,
    Equation,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::Set => write!(f, "Set"),
            SymbolKind::Parameter => write!(f, "Parameter"),
            SymbolKind::Variable => write!(f, "Variable"),
            SymbolKind::Equation => write!(f, "Equation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VarType {
    Unknown,
    Binary,
    Integer,
    Positive,
    Negative,
    #[default]
    Free,
    Sos1,
    Sos2,
    SemiCont,
    SemiInt,
}

impl VarType {
    /// Default (lower, upper) bounds of a fresh variable record.
    pub fn default_bounds(&self) -> (f64, f64) {
        match self {
            VarType::Binary => (0.0, 1.0),
            VarType::Integer => (0.0, 100.0),
            VarType::Positive | VarType::Sos1 | VarType::Sos2 => (0.0, f64::INFINITY),
            VarType::Negative => (f64::NEG_INFINITY, 0.0),
            VarType::SemiCont | VarType::SemiInt => (1.0, f64::INFINITY),
            VarType::Unknown | VarType::Free => (f64::NEG_INFINITY, f64::INFINITY),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EquType {
    #[default]
    E,
    G,
    L,
    N,
    X,
    C,
}

impl EquType {
    pub fn default_bounds(&self) -> (f64, f64) {
        match self {
            EquType::E => (0.0, 0.0),
            EquType::G => (0.0, f64::INFINITY),
            EquType::L => (f64::NEG_INFINITY, 0.0),
            EquType::N | EquType::X | EquType::C => (f64::NEG_INFINITY, f64::INFINITY),
        }
    }
}

/// Which attribute of the model symbol a modifier writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateAction {
    /// Supplies parameter values.
    Param,
    /// Supplies upper bounds for a variable.
    Upper,
    /// Supplies lower bounds for a variable.
    Lower,
    /// Supplies fixed bounds for a variable.
    Fixed,
    /// Supplies the level of a variable or equation.
    Primal,
    /// Supplies the marginal of a variable or equation.
    Dual,
}

impl UpdateAction {
    /// Actions that only make sense for variables.
    pub fn is_bound_action(&self) -> bool {
        matches!(self, UpdateAction::Upper | UpdateAction::Lower | UpdateAction::Fixed)
    }
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UpdateAction::Param => "Param",
            UpdateAction::Upper => "Upper",
            UpdateAction::Lower => "Lower",
            UpdateAction::Fixed => "Fixed",
            UpdateAction::Primal => "Primal",
            UpdateAction::Dual => "Dual",
        };
        write!(f, "{}", text)
    }
}

/// What happens to a native record when the sync store has no matching record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UpdateType {
    /// Use zero.
    UseZeroIfMissing,
    /// Use the value captured at instantiation.
    UseOriginalIfMissing,
    /// Keep whatever the previous solve left.
    KeepPreviousIfMissing,
    /// Take the policy from the solve call.
    #[default]
    InheritFromSolveCall,
}

impl UpdateType {
    /// Effective policy of a modifier given the policy passed to `solve`.
    pub fn resolve(self, solve_call: UpdateType) -> UpdateType {
        match self {
            UpdateType::InheritFromSolveCall => match solve_call {
                UpdateType::InheritFromSolveCall => UpdateType::UseOriginalIfMissing,
                other => other,
            },
            own => own,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelStatus {
    OptimalGlobal = 1,
    OptimalLocal,
    Unbounded,
    InfeasibleGlobal,
    InfeasibleLocal,
    InfeasibleIntermed,
    Feasible,
    IntegerSolution,
    NonIntegerIntermed,
    IntegerInfeasible,
    LicenseError,
    ErrorUnknown,
    ErrorNoSolution,
    NoSolutionReturned,
    SolvedUnique,
    Solved,
    SolvedSingular,
    UnboundedNoSolution,
    InfeasibleNoSolution,
}

impl ModelStatus {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        use ModelStatus::*;
        let status = match code {
            1 => OptimalGlobal,
            2 => OptimalLocal,
            3 => Unbounded,
            4 => InfeasibleGlobal,
            5 => InfeasibleLocal,
            6 => InfeasibleIntermed,
            7 => Feasible,
            8 => IntegerSolution,
            9 => NonIntegerIntermed,
            10 => IntegerInfeasible,
            11 => LicenseError,
            12 => ErrorUnknown,
            13 => ErrorNoSolution,
            14 => NoSolutionReturned,
            15 => SolvedUnique,
            16 => Solved,
            17 => SolvedSingular,
            18 => UnboundedNoSolution,
            19 => InfeasibleNoSolution,
            _ => return None,
        };
        Some(status)
    }

    pub fn text(&self) -> &'static str {
        use ModelStatus::*;
        match self {
            OptimalGlobal => "Optimal",
            OptimalLocal => "Locally Optimal",
            Unbounded => "Unbounded",
            InfeasibleGlobal => "Infeasible",
            InfeasibleLocal => "Locally Infeasible",
            InfeasibleIntermed => "Intermediate Infeasible",
            Feasible => "Feasible Solution",
            IntegerSolution => "Integer Solution",
            NonIntegerIntermed => "Intermediate Non-Integer",
            IntegerInfeasible => "Integer Infeasible",
            LicenseError => "Licensing Problem",
            ErrorUnknown => "Error Unknown",
            ErrorNoSolution => "Error No Solution",
            NoSolutionReturned => "No Solution Returned",
            SolvedUnique => "Solved Unique",
            Solved => "Solved",
            SolvedSingular => "Solved Singular",
            UnboundedNoSolution => "Unbounded - No Solution",
            InfeasibleNoSolution => "Infeasible - No Solution",
        }
    }

    pub fn is_optimal(&self) -> bool {
        matches!(self, ModelStatus::OptimalGlobal | ModelStatus::OptimalLocal)
    }

    pub fn is_infeasible(&self) -> bool {
        matches!(
            self,
            ModelStatus::InfeasibleGlobal
                | ModelStatus::InfeasibleLocal
                | ModelStatus::InfeasibleIntermed
                | ModelStatus::IntegerInfeasible
                | ModelStatus::InfeasibleNoSolution
        )
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolveStatus {
    Normal = 1,
    Iteration,
    Resource,
    Solver,
    EvalError,
    Capability,
    License,
    User,
    SetupErr,
    SolverErr,
    InternalErr,
    Skipped,
    SystemErr,
}

impl SolveStatus {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        use SolveStatus::*;
        let status = match code {
            1 => Normal,
            2 => Iteration,
            3 => Resource,
            4 => Solver,
            5 => EvalError,
            6 => Capability,
            7 => License,
            8 => User,
            9 => SetupErr,
            10 => SolverErr,
            11 => InternalErr,
            12 => Skipped,
            13 => SystemErr,
            _ => return None,
        };
        Some(status)
    }

    pub fn text(&self) -> &'static str {
        use SolveStatus::*;
        match self {
            Normal => "Normal Completion",
            Iteration => "Iteration Interrupt",
            Resource => "Resource Interrupt",
            Solver => "Terminated By Solver",
            EvalError => "Evaluation Interrupt",
            Capability => "Capability Problems",
            License => "Licensing Problems",
            User => "User Interrupt",
            SetupErr => "Setup Failure",
            SolverErr => "Solver Failure",
            InternalErr => "Internal Solver Failure",
            Skipped => "Solve Processing Skipped",
            SystemErr => "System Failure",
        }
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}

/// Workspace verbosity, ordered from quiet to chatty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum DebugLevel {
    #[default]
    Off,
    /// Keep temporary files.
    KeepFiles,
    /// Send the solver log to stdout and keep temporary files.
    ShowLog,
    /// Like `ShowLog` plus internal tracing.
    Verbose,
}

impl FromStr for DebugLevel {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(DebugLevel::Off),
            "keepfiles" => Ok(DebugLevel::KeepFiles),
            "showlog" => Ok(DebugLevel::ShowLog),
            "verbose" => Ok(DebugLevel::Verbose),
            other => Err(ModelError::InvalidArgument(format!(
                "Unknown debug level '{}'",
                other
            ))),
        }
    }
}

/// Completion codes of a compile/solve job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitCode {
    NormalReturn = 0,
    SolverToBeCalled = 1,
    CompilationError = 2,
    ExecutionError = 3,
    SystemLimitsReached = 4,
    FileError = 5,
    ParameterError = 6,
    LicensingError = 7,
    SystemError = 8,
    CouldNotStart = 9,
    OutOfMemory = 10,
    OutOfDisk = 11,
    CouldNotCreateScratchDir = 109,
}

impl ExitCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }
}
