/// Contact details a freshly registered user exposes to the notification pipeline.
///
/// Implemented explicitly by each user-like type so the publisher never has to
/// guess at field names.
pub trait Registrant {
    fn email(&self) -> &str;

    fn display_name(&self) -> &str;

    fn phone_number(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredUser {
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
}

impl RegisteredUser {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        phone_number: Option<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            phone_number,
        }
    }
}

impl Registrant for RegisteredUser {
    fn email(&self) -> &str {
        &self.email
    }

    fn display_name(&self) -> &str {
        &self.username
    }

    fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }
}
