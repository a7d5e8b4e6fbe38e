fn main() -> std::process::ExitCode {
    roster_scan_lib::run()
}
