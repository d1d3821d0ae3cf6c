
// Adapted from anyhow's debug formatter
struct Indented<'a, T> {
    inner: &'a mut T,
    indent: usize,
    prefix: Option<&'a str>,
}
impl<'a, T> Indented<'a, T> where T: std::fmt::Write {
    fn new(inner: &'a mut T, indent: usize, prefix: Option<&'a str>) -> Self {
        Indented {
            inner,
            indent,
            prefix,
        }
    }
}
impl<'a, T> std::fmt::Write for Indented<'a, T> where T: std::fmt::Write {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        let mut first_segment = true;
        for line in s.split('\n') {
            if let Some(prefix) = self.prefix.take() {
                write!(self.inner, "{:>width$}", prefix, width=self.indent)?;
            } else if !first_segment {
                // If we have reached a newline; print out an equivalent and then indentation
                self.inner.write_char('\n')?;
                write!(self.inner, "{:>width$}", "", width=self.indent)?;
            }
            self.inner.write_str(line)?;
            first_segment = false;
        }
        Ok(())
    }
}

/// Write `error` followed by its numbered `source()` chain.
pub fn format_error<E, W>(f: &mut W, error: &E) -> Result<(), std::fmt::Error>
where
    W: std::fmt::Write,
    E: std::error::Error + ?Sized,
{
    use std::fmt::Write;
    write!(f, "{}", error)?;

    if let Some(cause) = error.source() {
        write!(f, "\n\nCaused by:")?;
        let mut next_cause = Some(cause);
        let mut n = 0;
        while let Some(cause) = next_cause {
            writeln!(f)?;
            let prefix = format!("{}: ", n);
            let mut indented = Indented::new(f, 7, Some(&prefix));
            write!(indented, "{}", cause)?;
            next_cause = cause.source();
            n += 1;
        }
    }
    Ok(())
}

pub fn format_error_disp<'a, E>(e: &'a E) -> impl std::fmt::Display + 'a where E: std::error::Error + ?Sized {
    struct Disp<'a, E: ?Sized>(&'a E);
    impl<E> std::fmt::Display for Disp<'_, E> where E: std::error::Error + ?Sized {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            format_error(f, self.0)
        }
    }
    Disp(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("reading config")]
    struct Outer(#[source] Middle);

    #[derive(Debug, thiserror::Error)]
    #[error("bad yaml\nat line 3")]
    struct Middle(#[source] std::fmt::Error);

    #[test]
    fn formats_cause_chain() {
        let err = Outer(Middle(std::fmt::Error));
        let text = format_error_disp(&err).to_string();
        assert_eq!(
            text,
            "reading config\n\nCaused by:\n    0: bad yaml\n       at line 3\n    1: an error occurred when formatting an argument",
        );
    }

    #[test]
    fn works_through_trait_objects() {
        let err: Box<dyn std::error::Error + Send + Sync> = Box::new(Middle(std::fmt::Error));
        assert!(format_error_disp(&*err).to_string().starts_with("bad yaml"));
    }
}
