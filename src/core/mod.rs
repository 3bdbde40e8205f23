pub mod error;
pub mod types;
pub mod value;

pub use error::{check_native, ModelError, NativeError, NativeResult, Result};
pub use types::{
    DebugLevel, EquType, ExitCode, ModelStatus, SolveStatus, SymbolKind, UpdateAction, UpdateType,
    VarType,
};
pub use value::{LevelRecord, Record, EPS, INF, MINUS_INF, NA, UNDEF};
