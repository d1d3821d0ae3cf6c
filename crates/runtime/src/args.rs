
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgError {
    #[error("Invalid boolean flag: {:?}", .0)]
    InvalidBool(String),
    #[error("Flag -{} is missing an argument", .0)]
    MissingArg(String),
    #[error("Unknown flag -{}", .0)]
    UnknownFlag(String),
    #[error("Unexpected argument {:?}", .0)]
    UnexpectedArg(String),
}

/// Parse a boolean flag; true is "-c" or "-c=true", false is "-c=false"
pub fn parse_flag_optional_bool(value: Option<&str>) -> Result<bool, ArgError> {
    match value {
        None => Ok(true),
        Some("false" | "no") => Ok(false),
        Some("true" | "yes") => Ok(true),
        Some(s) => Err(ArgError::InvalidBool(s.into())),
    }
}

/// Parse a required parameter for an option, either inline or as the next arg
pub fn parse_param(
    flag: &str, args: &mut impl Iterator<Item = String>, inline: Option<&str>
) -> Result<String, ArgError> {
    match inline {
        Some(v) => Ok(v.into()),
        None => args.next().ok_or_else(|| ArgError::MissingArg(flag.into())),
    }
}

/// Walk `args` (program name first), handing `-flag[=value]` arguments to
/// `handle_flag` and everything else to `handle_pos`. A bare `--` ends flag
/// parsing. Either handler returning `Ok(None)` stops early, as for `-help`.
pub fn parse_args<I, F, P, E>(
    mut args: I,
    mut handle_flag: F,
    mut handle_pos: P,
) -> Result<Option<()>, E>
where
    I: Iterator<Item = String>,
    F: FnMut(&str, Option<&str>, &mut I, &str) -> Result<Option<()>, E>,
    P: FnMut(usize, String) -> Result<Option<()>, E>,
{
    let mut in_flags = true;
    let mut pos_index = 0;
    let arg0 = args.next().unwrap_or_else(|| "unknown".into());

    while let Some(arg) = args.next() {
        // A lone "-" is the conventional name for stdin, not a flag
        if in_flags && arg.len() > 1 && arg.starts_with('-') {
            let (flag, inline) = match arg[1..].split_once('=') {
                Some((flag, value)) => (flag, Some(value)),
                None => (&arg[1..], None),
            };

            if flag == "-" && inline.is_none() {
                in_flags = false;
            } else if handle_flag(flag, inline, &mut args, &arg0)?.is_none() {
                return Ok(None);
            }
        } else {
            if handle_pos(pos_index, arg)?.is_none() {
                return Ok(None);
            }
            pos_index += 1;
        }
    }

    Ok(Some(()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        std::iter::once("prog".to_string()).chain(list.iter().map(|s| s.to_string())).collect::<Vec<_>>().into_iter()
    }

    type Seen = (Vec<(String, Option<String>)>, Vec<String>);

    fn collect(list: &[&str]) -> Result<Option<Seen>, ArgError> {
        let (mut flags, mut pos) = (Vec::new(), Vec::new());
        let res = parse_args(
            args(list),
            |flag, inline, rest, _| -> Result<Option<()>, ArgError> {
                match flag {
                    "config" => {
                        let value = parse_param(flag, rest, inline)?;
                        flags.push((flag.to_string(), Some(value)));
                    }
                    "stop" => return Ok(None),
                    "x" | "no-emoji" => flags.push((flag.to_string(), inline.map(str::to_string))),
                    _ => return Err(ArgError::UnknownFlag(flag.into())),
                }
                Ok(Some(()))
            },
            |_, value| -> Result<Option<()>, ArgError> {
                pos.push(value);
                Ok(Some(()))
            },
        )?;
        Ok(res.map(|()| (flags, pos)))
    }

    #[test]
    fn flags_and_positionals() {
        let (flags, pos) = collect(&["-config", "a.yaml", "in.md", "-x=1", "-config=b.yaml"]).unwrap().unwrap();
        assert_eq!(flags, vec![
            ("config".to_string(), Some("a.yaml".to_string())),
            ("x".to_string(), Some("1".to_string())),
            ("config".to_string(), Some("b.yaml".to_string())),
        ]);
        assert_eq!(pos, vec!["in.md"]);
    }

    #[test]
    fn double_dash_ends_flags() {
        let (flags, pos) = collect(&["-x", "--", "-config", "-"]).unwrap().unwrap();
        assert_eq!(flags.len(), 1);
        assert_eq!(pos, vec!["-config", "-"]);
    }

    #[test]
    fn errors_and_early_stop() {
        assert_eq!(collect(&["-config"]), Err(ArgError::MissingArg("config".into())));
        assert_eq!(collect(&["-nope"]), Err(ArgError::UnknownFlag("nope".into())));
        assert_eq!(collect(&["-stop", "-nope"]), Ok(None));
    }

    #[test]
    fn optional_bools() {
        assert_eq!(parse_flag_optional_bool(None), Ok(true));
        assert_eq!(parse_flag_optional_bool(Some("no")), Ok(false));
        assert_eq!(parse_flag_optional_bool(Some("maybe")), Err(ArgError::InvalidBool("maybe".into())));
    }
}
