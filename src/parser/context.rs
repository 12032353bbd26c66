/// Subject/course context threaded through one parse pass.
///
/// Header rows interleave with data rows on the listing page, so the most
/// recently seen subject code and course title apply to every data row until
/// the next header. One instance per pass; never shared across passes.
#[derive(Debug, Default)]
pub struct HeaderContext {
    current_subject: Option<String>,
    current_course_title: Option<String>,
}

impl HeaderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_subject(&mut self, code: impl Into<String>) {
        self.current_subject = Some(code.into());
    }

    pub fn set_course_title(&mut self, text: impl Into<String>) {
        self.current_course_title = Some(text.into());
    }

    pub fn subject(&self) -> Option<&str> {
        self.current_subject.as_deref()
    }

    pub fn course_title(&self) -> Option<&str> {
        self.current_course_title.as_deref()
    }
}
