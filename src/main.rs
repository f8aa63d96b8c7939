fn main() -> std::process::ExitCode {
    deal_desk_lib::run()
}
