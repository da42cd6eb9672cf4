use std::io::{self, BufRead, Write};

/// Ask until the answer is yes or no. End of input counts as no.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> io::Result<bool> {
    loop {
        write!(out, "Continue ? [y]es [n]o : ")?;
        out.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            writeln!(out)?;
            return Ok(false);
        }
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => {
                writeln!(out)?;
                return Ok(true);
            }
            "n" | "no" => return Ok(false),
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ask(answers: &str) -> (bool, String) {
        let mut input = Cursor::new(answers.as_bytes().to_vec());
        let mut out = Vec::new();
        let confirmed = confirm(&mut input, &mut out).unwrap();
        (confirmed, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_confirm() {
        assert!(ask("y\n").0);
        assert!(ask("YES\n").0);
        assert!(!ask("n\n").0);
        assert!(!ask("").0);
    }

    #[test]
    fn test_asks_again_on_other_answers() {
        let (confirmed, written) = ask("maybe\nsure\nyes\n");
        assert!(confirmed);
        assert_eq!(written.matches("Continue ?").count(), 3);
    }
}
