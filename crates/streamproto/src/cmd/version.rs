use streamproto_frame::{MAX_FRAME_LEN, MAX_PAYLOAD};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("streamproto {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: streamproto");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("STREAMPROTO_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("STREAMPROTO_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("max_frame_len: {MAX_FRAME_LEN}");
    println!("max_payload: {MAX_PAYLOAD}");
    println!(
        "features: async={}, cli=true, unix-transport={}",
        cfg!(feature = "async"),
        cfg!(unix)
    );

    Ok(SUCCESS)
}
