use askama::Template;

/// HTML body of a queued notification email.
#[derive(Template)]
#[template(path = "email/notice.html")]
pub struct EmailNoticeTemplate<'a> {
    pub heading: &'a str,
    pub recipient_name: &'a str,
    pub body: &'a str,
    pub proposal_title: &'a str,
    pub location: &'a str,
    pub starts: String,
    pub status_label: &'a str,
}
