//! Console input.

use chatwire_core::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Switch the conversation partner.
    To(UserId),
    Say(String),
    Typing,
    Read(UserId),
    Poll,
    Status,
    Quit,
}

pub const HELP: &str = "\
commands:
  /to <user>    talk to <user>
  /typing       tell them you are typing
  /read <user>  mark everything from <user> as read
  /poll         check for unread messages now
  /status       show the connection
  /quit
anything else is sent as a chat message";

pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };

    let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));
    let user = |arg: &str| {
        arg.parse::<UserId>()
            .map_err(|e| format!("/{name}: {e}"))
    };
    let command = match name {
        "to" => Command::To(user(arg)?),
        "read" => Command::Read(user(arg)?),
        "typing" => Command::Typing,
        "poll" => Command::Poll,
        "status" => Command::Status,
        "quit" | "exit" => Command::Quit,
        _ => return Err(HELP.to_string()),
    };
    Ok(Some(command))
}
