//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter         | Implements       | Connects to                  |
//! |-----------------|------------------|------------------------------|
//! | `register_bank` | RegisterBus      | In-process holding registers |
//! | `code_gen`      | CodeGenerator    | chrono + rand token scheme   |
//! | `printer`       | Printer          | Log output                   |
//! | `report_text`   | ReportAssembler  | UTF-8 text document          |
//! | `storage`       | StoragePort      | In-memory key/value map      |
//! | `time`          | Clock            | Host wall clock              |
//! | `log_sink`      | EventSink        | Log output                   |
//! | `config_file`   | ConfigPort       | JSON file on disk            |

pub mod code_gen;
pub mod config_file;
pub mod log_sink;
pub mod printer;
pub mod register_bank;
pub mod report_text;
pub mod storage;
pub mod time;
