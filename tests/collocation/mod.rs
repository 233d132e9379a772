mod min_effort;
mod solver;
mod transcription;
