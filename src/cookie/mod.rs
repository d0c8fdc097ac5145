//! Cookies
//!
//! A [`CookieJar`] holds the cookies of a session. The executor reads it before
//! each hop and stores every `Set-Cookie` of the response in it.
//!
//! [`Curl::exec`](crate::Curl::exec) uses the jar of the calling thread, so
//! consecutive executions on one thread share cookies while other threads have
//! their own. A jar only moves between threads by explicit export and import,
//! see [`save_thread_cookies`] and [`load_thread_cookies`].

use std::cell::RefCell;
use std::io;

use crate::io::Io;

pub mod file;
mod jar;
pub(crate) mod set_cookie;

pub use jar::{domain_matches, Cookie, CookieJar, Expiry};

thread_local! {
    static THREAD_JAR: RefCell<CookieJar> = RefCell::new(CookieJar::new());
}

/// Run `f` with the cookie jar of the current thread.
///
/// Calling this again from within `f` panics.
pub fn with_thread_jar<R>(f: impl FnOnce(&mut CookieJar) -> R) -> R {
    THREAD_JAR.with(|jar| f(&mut jar.borrow_mut()))
}

/// Write the current thread's cookies to `output` in the cookie file format.
pub fn save_thread_cookies(output: &dyn Io) -> io::Result<()> {
    let text = with_thread_jar(file::export);
    output.write(text.as_bytes(), false)
}

/// Add the cookies of the cookie file in `input` to the current thread's jar.
///
/// Returns the number of cookies added.
pub fn load_thread_cookies(input: &dyn Io) -> io::Result<usize> {
    let data = input.read_all()?;
    let text = String::from_utf8_lossy(&data);
    Ok(with_thread_jar(|jar| file::import(jar, &text)))
}
