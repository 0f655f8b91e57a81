//! Interactive stdin prompts.

use std::io::{self, BufRead, Write};

/// Parse a camera index typed by the user. Blank or unparsable input falls
/// back to camera 0, together with a notice to show the user.
pub fn parse_camera_index(input: &str) -> (u32, Option<&'static str>) {
    let input = input.trim();
    if input.is_empty() {
        return (0, Some("Using default camera 0."));
    }
    match input.parse() {
        Ok(index) => (index, None),
        Err(_) => (0, Some("Invalid input. Using default camera 0.")),
    }
}

/// Print `question` and read one line, without its line ending.
pub fn ask(input: &mut impl BufRead, output: &mut impl Write, question: &str) -> io::Result<String> {
    write!(output, "{question}")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

pub fn ask_camera_index(input: &mut impl BufRead, output: &mut impl Write) -> io::Result<u32> {
    let answer = ask(input, output, "Enter camera index (0 is default, 1, 2, etc.): ")?;
    let (index, notice) = parse_camera_index(&answer);
    if let Some(notice) = notice {
        writeln!(output, "{notice}")?;
    }
    Ok(index)
}
