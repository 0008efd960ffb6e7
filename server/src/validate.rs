use {
    crate::util::ApiError,
    regex::Regex,
    std::sync::LazyLock,
    toolbelt_protocol::endpoints::{Login, NoteInput, Signup},
};

pub const MIN_USERNAME_CHARS: usize = 3;
pub const MIN_PASSWORD_CHARS: usize = 6;

#[expect(clippy::expect_used, reason = "constant pattern")]
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@([A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?\.)+[A-Za-z]{2,}$",
    )
    .expect("invalid email pattern")
});

fn email(value: &str) -> Result<(), ApiError> {
    if EMAIL.is_match(value) {
        Ok(())
    } else {
        Err(ApiError::bad_request("Invalid email address"))
    }
}

fn password(value: &str) -> Result<(), ApiError> {
    if value.chars().count() >= MIN_PASSWORD_CHARS {
        Ok(())
    } else {
        Err(ApiError::bad_request("Password must be at least 6 characters"))
    }
}

#[inline]
pub fn signup(request: &Signup) -> Result<(), ApiError> {
    if request.username.chars().count() < MIN_USERNAME_CHARS {
        return Err(ApiError::bad_request(
            "Username must be at least 3 characters",
        ));
    }
    email(&request.email)?;
    password(&request.password)
}

#[inline]
pub fn login(request: &Login) -> Result<(), ApiError> {
    email(&request.email)?;
    password(&request.password)
}

#[inline]
pub fn note(request: &NoteInput) -> Result<(), ApiError> {
    if request.title.is_empty() || request.content.is_empty() {
        return Err(ApiError::bad_request("Title and content are required"));
    }
    Ok(())
}

#[inline]
pub fn todo_title(title: &str) -> Result<(), ApiError> {
    if title.is_empty() {
        return Err(ApiError::bad_request("Title is required"));
    }
    Ok(())
}
