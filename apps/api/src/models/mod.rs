pub mod prescreening;
pub mod question;
