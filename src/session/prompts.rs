//! Fixed spoken prompts.
//!
//! These strings are spoken verbatim by the TTS collaborator; they are not
//! generated.  Keeping them here, rather than inline in the runner, makes
//! the spoken surface of the device reviewable in one place.

/// Wake phrase that starts or redirects a session.
pub const WAKE_WORD: &str = "SOLSTIS";

/// Wake phrase that confirms a completed step.
pub const STEP_COMPLETE_WORD: &str = "STEP COMPLETE";

/// Spoken when the box opens or the wake word starts a session.
pub fn opening(user_name: &str) -> String {
    format!(
        "Hey {user_name}. I'm Solstis and I'm here to help. If this is a \
         life-threatening emergency, please call 9-1-1 now. Otherwise, is \
         there something I can help you with?"
    )
}

/// Spoken when the procedure completes and the session parks.
pub fn closing() -> String {
    format!("If you need any further help, please let me know by saying '{WAKE_WORD}'.")
}

/// Spoken when the user declines help in the opening exchange.
pub fn park_on_wake_word() -> String {
    format!("OK, if you need me for any help, say {WAKE_WORD} to wake me up.")
}

/// Spoken when a timeout fires with no user response.
pub fn no_response() -> String {
    format!("I am hearing no response, be sure to say '{WAKE_WORD}' if you need my assistance!")
}

/// Appended when an instruction lacks an explicit completion cue.
pub fn step_complete_reminder() -> String {
    format!("Say '{STEP_COMPLETE_WORD}' when you're done.")
}

/// Asked after a procedure-done classification before parking the session.
pub fn confirm_all_set() -> String {
    "Are you all set with the treatment, or is there anything else you need help with?".into()
}

/// Spoken when generation or transcription fails past the retry budget.
pub fn apology() -> String {
    "I'm sorry, I'm having trouble right now. Could you please repeat that?".into()
}
