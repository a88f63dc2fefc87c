//! Line protocol definitions
//!
//! ASCII text over TCP, one request per newline-terminated line:
//!
//! ```text
//! REG @name               -> OK | ERR <reason>
//! USRS                    -> @a, @b, ...
//! MSG @recipient <body>   -> (silent) | ERR <reason>
//! ```
//!
//! The keyword is case-insensitive and tokens are split on single
//! spaces. Unknown keywords are ignored without a reply.

use std::fmt;

use crate::error::{HubError, ProtocolError};
use crate::types::Handle;

/// Lines written to every new connection before any request is read
pub const WELCOME_BANNER: [&str; 5] = [
    "Connected to server",
    "\tREG <username> - register your client with an username. It must start with '@'.",
    "\tUSRS - list all active clients.",
    "\tMSG <username> <payload...> - send a message to a specific user.",
    "\tTo close your connection use Ctrl+C.",
];

/// Client → Server request, after local validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `REG @name`
    Register(Handle),
    /// `USRS`
    List,
    /// `MSG @recipient body...`
    Send { recipient: Handle, body: String },
}

impl Request {
    /// Parse one line of input
    ///
    /// Returns `Ok(None)` for blank lines and unrecognized keywords,
    /// which are dropped silently.
    pub fn parse(line: &str) -> Result<Option<Self>, ProtocolError> {
        let mut tokens = line.trim().split(' ');
        let keyword = tokens.next().unwrap_or_default().to_uppercase();
        let args: Vec<&str> = tokens.map(str::trim).collect();

        match keyword.as_str() {
            "REG" => parse_register(&args).map(Some),
            "USRS" => {
                if !args.is_empty() {
                    return Err(ProtocolError::UnexpectedArguments);
                }
                Ok(Some(Request::List))
            }
            "MSG" => parse_send(&args).map(Some),
            _ => Ok(None),
        }
    }
}

fn parse_register(args: &[&str]) -> Result<Request, ProtocolError> {
    let [name] = args else {
        return Err(ProtocolError::MissingUsername);
    };

    Handle::parse(name)
        .map(Request::Register)
        .ok_or_else(|| ProtocolError::UsernamePrefix(name.to_string()))
}

fn parse_send(args: &[&str]) -> Result<Request, ProtocolError> {
    let [recipient, rest @ ..] = args else {
        return Err(ProtocolError::MissingRecipient);
    };
    if rest.is_empty() {
        return Err(ProtocolError::MissingRecipient);
    }

    let recipient = Handle::parse(recipient).ok_or(ProtocolError::RecipientPrefix)?;

    let body = rest.join(" ");
    if body.trim().is_empty() {
        return Err(ProtocolError::EmptyBody);
    }

    Ok(Request::Send { recipient, body })
}

/// Server → Client line
///
/// `Display` renders the line without its terminator; the writer's
/// codec appends the single `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Registration accepted
    Ok,
    /// Any rejected request
    Error(String),
    /// Currently registered handles, unordered
    Users(Vec<Handle>),
    /// A direct message routed from another client
    Delivery { from: Handle, body: String },
    /// Informational text outside the request/response grammar
    Notice(String),
}

impl Reply {
    /// The welcome banner as a sequence of notice lines
    pub fn welcome() -> impl Iterator<Item = Reply> {
        WELCOME_BANNER
            .iter()
            .map(|line| Reply::Notice((*line).to_string()))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => f.write_str("OK"),
            Reply::Error(reason) => write!(f, "ERR {}", reason),
            Reply::Users(handles) => {
                for (i, handle) in handles.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", handle)?;
                }
                Ok(())
            }
            Reply::Delivery { from, body } => write!(f, "{}: {}", from, body),
            Reply::Notice(text) => f.write_str(text),
        }
    }
}

impl From<ProtocolError> for Reply {
    fn from(err: ProtocolError) -> Self {
        Reply::Error(err.to_string())
    }
}

impl From<HubError> for Reply {
    fn from(err: HubError) -> Self {
        Reply::Error(err.to_string())
    }
}
