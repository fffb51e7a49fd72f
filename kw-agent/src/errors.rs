use rocket::Responder;

#[derive(Responder)]
pub enum StatusResponseError {
    #[response(status = 404)]
    PollWatcherDisabled(String),
}
