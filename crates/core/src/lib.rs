pub mod auth;
pub mod config;
pub mod metrics;
pub mod redemption;
pub mod scanlog;
pub mod ticket;

pub use auth::{
    create_authenticator, ApiKeyAuthenticator, AuthError, AuthRequest, Authenticator, Identity,
    NoneAuthenticator,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthConfig, AuthMethod, Config,
    ConfigError, DatabaseConfig, RedemptionConfig, SanitizedConfig, ScannerKey, ServerConfig,
};
pub use redemption::{
    encode_opaque, encode_signed, parse_payload, PayloadDecodeError, QrPayload, RedemptionError,
    RedemptionResult, RedemptionService, RedemptionStatus, ScanRequest,
};
pub use scanlog::{
    NewScanRecord, ScanFilter, ScanLogError, ScanLogStore, ScanMetadata, ScanOutcome, ScanRecord,
    SqliteScanLog,
};
pub use ticket::{
    ConsumeOutcome, CreateTicketRequest, SqliteTicketStore, Ticket, TicketError, TicketFilter,
    TicketStatus, TicketStore, TicketView,
};
