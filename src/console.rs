//! Operator input: interface count and names, collected interactively.
//!
//! No flags and no config file; the interface set is fixed for the process's
//! lifetime once collected. Implemented over `BufRead`/`Write` so tests can
//! drive the prompts with cursors.

use std::io::{BufRead, Write};

use crate::core::errors::{NetwatchError, Result};

fn prompt(input: &mut impl BufRead, output: &mut impl Write, text: &str) -> Result<String> {
    write!(output, "{text}").map_err(console_error)?;
    output.flush().map_err(console_error)?;
    let mut line = String::new();
    let read = input.read_line(&mut line).map_err(console_error)?;
    if read == 0 {
        return Err(NetwatchError::Console {
            details: "end of input".to_string(),
        });
    }
    Ok(line.trim().to_string())
}

fn console_error(source: std::io::Error) -> NetwatchError {
    NetwatchError::Console {
        details: source.to_string(),
    }
}

/// Collects the interface count and each interface name, re-prompting on
/// invalid input.
pub fn collect_interfaces(
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<Vec<String>> {
    let count = loop {
        let answer = prompt(
            input,
            output,
            "How many interfaces would you like to monitor: ",
        )?;
        match answer.parse::<usize>() {
            Ok(count) if count > 0 => break count,
            _ => writeln!(output, "Error: please enter a valid number").map_err(console_error)?,
        }
    };

    let mut interfaces = Vec::with_capacity(count);
    for index in 0..count {
        loop {
            let name = prompt(
                input,
                output,
                &format!("Please enter the name of interface {index}: "),
            )?;
            if name.is_empty() || name.contains('/') || name.contains(char::is_whitespace) {
                writeln!(output, "Error: please enter a valid interface name")
                    .map_err(console_error)?;
                continue;
            }
            interfaces.push(name);
            break;
        }
    }
    Ok(interfaces)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::collect_interfaces;

    fn collect(script: &str) -> super::Result<Vec<String>> {
        let mut input = Cursor::new(script.to_string());
        let mut output = Vec::new();
        collect_interfaces(&mut input, &mut output)
    }

    #[test]
    fn collects_count_then_names_in_order() {
        let interfaces = collect("2\neth0\neth1\n").expect("valid script");
        assert_eq!(interfaces, ["eth0", "eth1"]);
    }

    #[test]
    fn reprompts_on_invalid_count() {
        let interfaces = collect("many\n0\n1\nwlan0\n").expect("eventually valid");
        assert_eq!(interfaces, ["wlan0"]);
    }

    #[test]
    fn reprompts_on_invalid_name() {
        let interfaces = collect("1\n\n../etc\neth0\n").expect("eventually valid");
        assert_eq!(interfaces, ["eth0"]);
    }

    #[test]
    fn end_of_input_is_a_console_error() {
        let err = collect("2\neth0\n").expect_err("script ends early");
        assert_eq!(err.code(), "NWM-1005");
    }
}
