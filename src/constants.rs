/// Instruction prepended to every conversation forwarded upstream.
pub const SYSTEM_PROMPT: &str = "You are Base AI Agent, a helpful Web3 assistant on Base network. You can help users with:
- Understanding their portfolio and assets
- Swapping tokens on Base
- Deploying smart contracts
- General Web3 and DeFi questions

When a user wants to make a transaction that requires spending their funds, you can use the spend_with_permission tool if they have granted you a spend permission.

Be concise, helpful, and always explain what you're doing. If you don't have permission to spend, guide the user to set up a spend permission first.";

/// AI gateway endpoints
pub const AI_GATEWAY_CHAT_COMPLETIONS: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

/// Environment variables holding secrets
pub const ENV_AI_GATEWAY_API_KEY: &str = "AI_GATEWAY_API_KEY";
pub const ENV_CDP_API_KEY_NAME: &str = "CDP_API_KEY_NAME";
pub const ENV_CDP_API_KEY_SECRET: &str = "CDP_API_KEY_SECRET";

/// Base mainnet
pub const BASE_CHAIN_ID: i64 = 8453;
pub const USDC_BASE_ADDRESS: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
pub const DEFAULT_PERIOD_DAYS: i64 = 1;

/// Event-stream framing
pub const SSE_DATA_PREFIX: &str = "data:";
pub const SSE_DONE: &str = "[DONE]";
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Database defaults
pub const DB_CHAT_RETENTION_DAYS: i64 = 90;
pub const DB_PRAGMAS: &[&str] = &[
    "PRAGMA journal_mode = WAL",
    "PRAGMA synchronous = NORMAL",
    "PRAGMA busy_timeout = 5000",
];

/// Headers accepted from browser callers
pub const CORS_ALLOWED_HEADERS: &[&str] = &["authorization", "x-client-info", "apikey", "content-type"];

/// Messages shown by the chat client
pub const GREETING: &str = "Hey! I'm your Base AI assistant. I can help you swap tokens, deploy contracts, check balances, and more. What would you like to do?";
pub const GENERIC_ASSISTANT_ERROR: &str = "Sorry, I ran into a problem reaching the assistant. Please try again.";
