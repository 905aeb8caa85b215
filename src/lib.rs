mod helper;
mod shell;

pub use shell::{
    alias::AliasTable,
    config::{Args, Config},
    engine::{
        deliver, spawn_builtin_background, spawn_external, wait_foreground, Builtin, CmdResult,
        Delivery, Dispatcher, Foreground, Job, JobId, JobState, JobTable, SignalBridge,
        SignalEvent, SignalKind, WaitOutcome, CMD_LENGTH_MAX, DEFAULT_KILL_GRACE, EXEC_FAILED,
        JOBS_NUM_MAX,
    },
    error::{ShellError, ShellResult},
    parser::{parse_cmd, split_chain, Cmd, ARGS_NUM_MAX},
    Shell,
};
