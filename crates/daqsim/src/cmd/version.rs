use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("daqsim {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: daqsim");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "build_target: {}",
        option_env!("DAQSIM_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "build_profile: {}",
        option_env!("DAQSIM_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!(
        "features: device={}, cli=true",
        cfg!(feature = "device")
    );
    println!(
        "protocol: frame {}..={} bytes, crc16/modbus",
        daqsim_frame::MIN_FRAME_SIZE,
        daqsim_frame::MAX_FRAME_SIZE
    );

    Ok(SUCCESS)
}
