use krenet_lib::frontend::cli;

pub fn main() {
    cli::main();
}
