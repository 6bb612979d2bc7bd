mod app;
mod camera;
mod controller;
mod input;
mod renderer;
mod scene;

fn main() {
    app::run();
}
