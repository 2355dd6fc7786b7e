use std::borrow::Cow;

/// Trait for handling script output, such as `show_debug_message`.
///
/// Implement this trait to capture or redirect what scripts print.
/// `StdPrint` writes to stdout.
pub trait PrintWriter {
    /// Writes a chunk of text without any terminator.
    ///
    /// # Arguments
    /// * `output` - The formatted text.
    fn stdout_write(&mut self, output: Cow<'_, str>);

    /// Adds a single character, usually the trailing newline of a message.
    fn stdout_push(&mut self, end: char);

    /// Writes `output` followed by a newline.
    fn write_line(&mut self, output: Cow<'_, str>) {
        self.stdout_write(output);
        self.stdout_push('\n');
    }
}

/// `PrintWriter` that writes to stdout.
#[derive(Debug)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) {
        print!("{output}");
    }

    fn stdout_push(&mut self, end: char) {
        print!("{end}");
    }
}

/// A `PrintWriter` that collects all output into a string.
///
/// Useful for testing or capturing script output programmatically.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    /// Returns the collected output as a string slice.
    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    /// Consumes the writer and returns the collected output.
    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) {
        self.0.push_str(&output);
    }

    fn stdout_push(&mut self, end: char) {
        self.0.push(end);
    }
}

/// `PrintWriter` that ignores all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn stdout_write(&mut self, _output: Cow<'_, str>) {}

    fn stdout_push(&mut self, _end: char) {}
}
