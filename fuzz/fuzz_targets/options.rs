#![no_main]

use libfuzzer_sys::fuzz_target;
use ocurl::{Interpreter, IoMap, MemIo};

// Tokens are separated by NUL. Only registered IOs resolve, so nothing touches
// the file system unless a token names a path.
fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let tokens: Vec<String> = text
        .split('\0')
        .filter(|t| !t.contains('@') && !t.contains('<'))
        .map(str::to_string)
        .collect();

    let mut ios = IoMap::new();
    ios.insert("in", std::sync::Arc::new(MemIo::from_bytes("a=1\r\nb=2")));

    let interpreter = Interpreter::new(&ios, MemIo::new());
    let _ = interpreter.interpret(&tokens);
});
