use labwatch_api::{InboundMessage, NetworkType};

/// AT command set of the SIM7600 family
pub mod at {
    pub const OK: &str = "\nOK";
    /// Final result line of a listing, which has to end the reply
    pub const LISTING_END: &str = "\r\nOK\r\n";
    pub const PROMPT: &str = "> ";
    pub const SENT: &str = "+CMGS:";
    pub const LISTED: &str = "+CMGL:";
    /// Ctrl-Z, terminates a message body or breaks out of a pending prompt
    pub const CTRL_Z: &str = "\x1A";

    pub const HEALTH_CHECK: &str = "AT\r";
    pub const FACTORY_RESET: &str = "AT&F\r";
    pub const GSM_CHARSET: &str = "AT+CSCS=\"GSM\"\r";
    pub const TEXT_MODE: &str = "AT+CMGF=1\r";
    pub const SIGNAL_QUALITY: &str = "AT+CSQ\r";
    pub const SYSTEM_INFO: &str = "AT+CPSI?\r";
    pub const LIST_UNREAD: &str = "AT+CMGL=\"REC UNREAD\"\r";

    pub fn send_to(number: &str) -> String {
        format!("AT+CMGS=\"{number}\"\r")
    }

    pub fn delete(index: u32) -> String {
        format!("AT+CMGD={index}\r")
    }
}

/// Longest segment handed to the modem in one `AT+CMGS`
pub const SEGMENT_MAX: usize = 155;
/// Shortest segment produced when a line or word boundary is available
pub const SEGMENT_MIN: usize = 130;

/// Splits on `\r\n`, `\r` and `\n`, each counting as one break
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                lines.push(&text[start..i]);
                if bytes.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                start = i + 1;
            }
            b'\n' => {
                lines.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    if start < bytes.len() {
        lines.push(&text[start..]);
    }

    lines
}

/// Drops the echoed command: a leading echo line, then a blank line followed by the echo
pub fn strip_echo(raw: &str, command: &str) -> String {
    let echo = command.trim_matches(|c| c == '\r' || c == '\n');
    let mut lines = split_lines(raw);

    if lines.first() == Some(&echo) {
        lines.remove(0);
    }
    if lines.len() > 1 && lines[0].is_empty() && lines[1] == echo {
        lines.drain(..2);
    }

    lines.join("\n")
}

/// Cuts `message` into segments of at most `max_len` characters.
///
/// A cut prefers the last newline in `[cursor + min_len, cursor + max_len)`, then
/// the last space in that range, else falls at `max_len`. The separator at a
/// newline or space cut is dropped.
pub fn partition(message: &str, max_len: usize, min_len: usize) -> Vec<String> {
    let chars: Vec<char> = message.chars().collect();
    let max_len = max_len.max(1);
    let min_len = min_len.min(max_len);
    let mut segments = Vec::new();
    let mut cursor = 0;

    while cursor < chars.len() {
        if chars.len() - cursor <= max_len {
            segments.push(chars[cursor..].iter().collect());
            break;
        }

        let window = (cursor + min_len)..(cursor + max_len);
        let cut = chars[window.clone()]
            .iter()
            .rposition(|&c| c == '\n')
            .or_else(|| chars[window.clone()].iter().rposition(|&c| c == ' '))
            .map(|offset| window.start + offset);

        match cut {
            Some(position) => {
                segments.push(chars[cursor..position].iter().collect());
                cursor = position + 1;
            }
            None => {
                segments.push(chars[cursor..cursor + max_len].iter().collect());
                cursor += max_len;
            }
        }
    }

    segments
}

/// Maps a raw RSSI to the 0-4 display bucket
pub fn signal_bucket(rssi: i32) -> u8 {
    match rssi {
        0..=9 => 1,
        10..=14 => 2,
        15..=19 => 3,
        20..=31 => 4,
        _ => 0,
    }
}

/// Bucket from a `+CSQ: <rssi>,<ber>` reply; errors and garbage count as no signal
pub fn parse_signal_quality(reply: &str) -> u8 {
    if reply.contains("ERROR") {
        return 0;
    }

    reply
        .split_once("+CSQ:")
        .and_then(|(_, rest)| rest.split(',').next())
        .and_then(|rssi| rssi.trim().parse::<i32>().ok())
        .map(signal_bucket)
        .unwrap_or(0)
}

/// Radio technology from an `AT+CPSI?` reply, first match in priority order
pub fn parse_network_type(reply: &str) -> NetworkType {
    const PRIORITY: &[(&[&str], NetworkType)] = &[
        (&["no service", "offline"], NetworkType::None),
        (&["gsm", "edge"], NetworkType::G2),
        (&["wcdma", "hsdpa", "hsupa", "hspa"], NetworkType::G3),
        (&["lte"], NetworkType::G4),
        (&["nr"], NetworkType::G5),
    ];

    if reply.contains("ERROR") {
        return NetworkType::None;
    }

    let reply = reply.to_lowercase();
    PRIORITY
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| reply.contains(needle)))
        .map(|(_, network)| *network)
        .unwrap_or(NetworkType::Unknown)
}

/// Parses an `AT+CMGL` listing.
///
/// Each entry is `+CMGL: <index>,"<stat>","<sender>",...` followed by body lines
/// up to the next entry or the final `OK`. Only the last `OK` line ends the
/// listing, so a body reading "OK" is kept.
pub fn parse_unread(reply: &str) -> Vec<InboundMessage> {
    let mut messages: Vec<InboundMessage> = Vec::new();
    let mut body_lines: Vec<&str> = Vec::new();
    let mut current: Option<(u32, String)> = None;

    let lines = split_lines(reply);
    let end = lines
        .iter()
        .rposition(|line| line.trim() == "OK")
        .unwrap_or(lines.len());

    for &line in &lines[..end] {
        if let Some(header) = line.trim_start().strip_prefix(at::LISTED) {
            flush(&mut messages, &mut current, &mut body_lines);
            current = parse_listing_header(header);
            if current.is_none() {
                tracing::warn!("Unparseable listing header: {}", line);
            }
        } else if current.is_some() {
            body_lines.push(line);
        }
    }
    flush(&mut messages, &mut current, &mut body_lines);

    messages
}

fn flush<'a>(
    messages: &mut Vec<InboundMessage>,
    current: &mut Option<(u32, String)>,
    body_lines: &mut Vec<&'a str>,
) {
    if let Some((index, sender)) = current.take() {
        messages.push(InboundMessage {
            index,
            sender,
            body: body_lines.join("\n").trim().to_string(),
        });
    }
    body_lines.clear();
}

fn parse_listing_header(header: &str) -> Option<(u32, String)> {
    let mut fields = header.split(',');
    let index = fields.next()?.trim().parse().ok()?;
    let _status = fields.next()?;
    let sender = fields.next()?.trim().trim_matches('"').to_string();

    if sender.is_empty() {
        return None;
    }

    Some((index, sender))
}
